// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Hive Configuration
//!
//! This module provides the configuration surface consumed at hive
//! construction time: the exchange pair overrides and one [`QueueConfig`] per
//! queue. The configuration is immutable once the hive is built; dispatchers
//! and workers only read from it.

use crate::topology::{DEFAULT_DELAYED_EXCHANGE, DEFAULT_DIRECT_EXCHANGE};
use lapin::types::{AMQPValue, ShortString};
use std::collections::{BTreeMap, HashMap};

/// Configuration for the whole hive: the direct/delayed exchange pair and
/// every queue the hive owns.
///
/// Queue names are unique keys; registering a queue with an existing name
/// replaces the previous definition.
#[derive(Debug, Clone)]
pub struct HiveConfig {
    pub(crate) direct_exchange: ExchangeConfig,
    pub(crate) delayed_exchange: ExchangeConfig,
    pub(crate) queues: HashMap<String, QueueConfig>,
}

impl Default for HiveConfig {
    fn default() -> Self {
        HiveConfig {
            direct_exchange: ExchangeConfig::new(DEFAULT_DIRECT_EXCHANGE),
            delayed_exchange: ExchangeConfig::new(DEFAULT_DELAYED_EXCHANGE),
            queues: HashMap::default(),
        }
    }
}

impl HiveConfig {
    pub fn new() -> HiveConfig {
        HiveConfig::default()
    }

    /// Adds a queue definition to the hive.
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queues.insert(queue.name.clone(), queue);
        self
    }

    /// Overrides the direct exchange definition.
    pub fn direct_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.direct_exchange = exchange;
        self
    }

    /// Overrides the delayed exchange definition.
    ///
    /// The delayed exchange is always declared with its internal routing
    /// mode forced to `direct`, whatever arguments are supplied here.
    pub fn delayed_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.delayed_exchange = exchange;
        self
    }

    pub(crate) fn queue_config(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.get(name)
    }
}

/// Definition of one exchange of the pair.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) auto_delete: bool,
    pub(crate) arguments: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeConfig {
    pub fn new(name: &str) -> ExchangeConfig {
        ExchangeConfig {
            name: name.to_owned(),
            durable: false,
            auto_delete: false,
            arguments: BTreeMap::default(),
        }
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Adds a single declare argument to the exchange.
    pub fn argument(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// Definition of a queue with its declare options and publish defaults.
///
/// The `delayed` flag decides, once and for all, which exchange of the pair
/// the queue is bound to and which exchange dispatches for it route through.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    pub(crate) name: String,
    pub(crate) is_delayed: bool,
    pub(crate) durable: bool,
    pub(crate) exclusive: bool,
    pub(crate) auto_delete: bool,
    pub(crate) ttl: Option<i32>,
    pub(crate) max_length: Option<i32>,
    pub(crate) max_length_bytes: Option<i32>,
    pub(crate) publish: PublishDefaults,
}

impl QueueConfig {
    pub fn new(name: &str) -> QueueConfig {
        QueueConfig {
            name: name.to_owned(),
            ..QueueConfig::default()
        }
    }

    /// Binds the queue to the delayed exchange instead of the direct one.
    pub fn delayed(mut self) -> Self {
        self.is_delayed = true;
        self
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Makes the queue exclusive to the connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(mut self, max_bytes: i32) -> Self {
        self.max_length_bytes = Some(max_bytes);
        self
    }

    /// Adds a default header applied to every message dispatched to this
    /// queue. Per-call headers with the same key win over these.
    pub fn publish_header(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.publish.headers.insert(key.into(), value);
        self
    }

    /// Publishes messages to this queue as persistent (delivery mode 2) by
    /// default.
    pub fn persistent(mut self) -> Self {
        self.publish.delivery_mode = Some(2);
        self
    }

    /// Sets the default publish priority for this queue.
    pub fn publish_priority(mut self, priority: u8) -> Self {
        self.publish.priority = Some(priority);
        self
    }

    /// Sets the default per-message expiration for this queue, in
    /// milliseconds.
    pub fn publish_expiration(mut self, expiration_ms: u32) -> Self {
        self.publish.expiration = Some(expiration_ms.to_string());
        self
    }
}

/// Queue-level publish defaults, merged under per-call dispatch options.
#[derive(Debug, Clone, Default)]
pub struct PublishDefaults {
    pub(crate) headers: BTreeMap<ShortString, AMQPValue>,
    pub(crate) delivery_mode: Option<u8>,
    pub(crate) priority: Option<u8>,
    pub(crate) expiration: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    #[test]
    fn default_exchange_names() {
        let config = HiveConfig::new();
        assert_eq!(config.direct_exchange.name, "amqp-hive-direct");
        assert_eq!(config.delayed_exchange.name, "amqp-hive-delayed");
    }

    #[test]
    fn queues_are_keyed_by_name() {
        let config = HiveConfig::new()
            .queue(QueueConfig::new("Foo"))
            .queue(QueueConfig::new("Bar").delayed());

        assert!(!config.queue_config("Foo").unwrap().is_delayed);
        assert!(config.queue_config("Bar").unwrap().is_delayed);
        assert!(config.queue_config("Baz").is_none());
    }

    #[test]
    fn redefining_a_queue_replaces_it() {
        let config = HiveConfig::new()
            .queue(QueueConfig::new("Foo"))
            .queue(QueueConfig::new("Foo").durable());

        assert!(config.queue_config("Foo").unwrap().durable);
        assert_eq!(config.queues.len(), 1);
    }

    #[test]
    fn publish_defaults_accumulate() {
        let queue = QueueConfig::new("Foo")
            .persistent()
            .publish_priority(3)
            .publish_expiration(60_000)
            .publish_header("x-origin", AMQPValue::LongString(LongString::from("hive")));

        assert_eq!(queue.publish.delivery_mode, Some(2));
        assert_eq!(queue.publish.priority, Some(3));
        assert_eq!(queue.publish.expiration.as_deref(), Some("60000"));
        assert!(queue
            .publish
            .headers
            .contains_key(&ShortString::from("x-origin")));
    }
}
