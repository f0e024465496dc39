// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Dispatcher
//!
//! This module publishes payloads into the hive's topology. A dispatch
//! serializes the payload as UTF-8 JSON, merges headers (queue defaults,
//! then per-call options, then the injected delay header) and publishes to
//! the exchange selected by the queue's static delayed flag, with the queue
//! name as routing key.
//!
//! Dispatch is fire-and-forget-once: there is no retry, and publish errors
//! propagate directly to the caller.

use crate::{
    config::{HiveConfig, QueueConfig},
    errors::HiveError,
    topology::ExchangePair,
};
use lapin::{
    options::BasicPublishOptions,
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, LongLongInt, ShortString},
    BasicProperties, Channel,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};
use uuid::Uuid;

/// Header carrying the delay in milliseconds, consumed by the
/// delayed-message exchange plugin
pub const AMQP_HEADERS_DELAY: &str = "x-delay";
/// Content type stamped on every dispatched message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Per-call dispatch options: extra headers, publish property overrides and
/// an optional delivery delay.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub(crate) headers: BTreeMap<ShortString, AMQPValue>,
    pub(crate) delivery_mode: Option<u8>,
    pub(crate) priority: Option<u8>,
    pub(crate) expiration: Option<String>,
    pub(crate) delay_ms: Option<u64>,
}

impl DispatchOptions {
    pub fn new() -> DispatchOptions {
        DispatchOptions::default()
    }

    /// Adds a header to this dispatch. Wins over a queue-level default
    /// header with the same key.
    pub fn header(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Delays delivery by the given number of milliseconds.
    ///
    /// The delay is carried as an `x-delay` header consumed by the delayed
    /// exchange plugin. It only takes effect when the target queue is
    /// configured as delayed: the routing exchange is chosen by the queue's
    /// static flag, so a delay against a non-delayed queue sets the header
    /// but has no effect on timing.
    pub fn delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Publishes this message as persistent (delivery mode 2).
    pub fn persistent(mut self) -> Self {
        self.delivery_mode = Some(2);
        self
    }

    /// Sets the publish priority for this message.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the per-message expiration, in milliseconds.
    pub fn expiration(mut self, expiration_ms: u32) -> Self {
        self.expiration = Some(expiration_ms.to_string());
        self
    }
}

/// Publishes payloads to the queues of one hive. Created through
/// [`crate::hive::Hive::dispatcher`]; borrows the hive's channel and
/// topology and becomes invalid once the hive is destroyed.
pub struct Dispatcher {
    channel: Arc<Channel>,
    config: Arc<HiveConfig>,
    exchanges: ExchangePair,
}

impl Dispatcher {
    pub(crate) fn new(
        channel: Arc<Channel>,
        config: Arc<HiveConfig>,
        exchanges: ExchangePair,
    ) -> Dispatcher {
        Dispatcher {
            channel,
            config,
            exchanges,
        }
    }

    /// Serializes `payload` as JSON and publishes it to `queue_name`'s
    /// exchange with the queue name as routing key.
    ///
    /// Returns the broker's flow-control acknowledgement: `true` unless the
    /// broker negatively confirmed the publish. A `false` is a backpressure
    /// signal, not a failure.
    ///
    /// Dispatching to a queue name that is not configured on the hive is a
    /// programmer error and fails with [`HiveError::UnknownQueue`] before
    /// any broker call.
    pub async fn dispatch<P: Serialize>(
        &self,
        queue_name: &str,
        payload: &P,
        options: DispatchOptions,
    ) -> Result<bool, HiveError> {
        let queue = self
            .config
            .queue_config(queue_name)
            .ok_or_else(|| HiveError::UnknownQueue(queue_name.to_owned()))?;

        let data = serde_json::to_vec(payload).map_err(|err| HiveError::SerializePayload {
            queue: queue_name.to_owned(),
            source: err,
        })?;

        let exchange = self.exchanges.for_queue(queue);
        let properties = merged_properties(queue, &options);

        debug!("publishing to exchange: {} key: {}", exchange, queue_name);

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                queue_name,
                BasicPublishOptions::default(),
                &data,
                properties,
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error publishing message");
                HiveError::Publish {
                    queue: queue_name.to_owned(),
                    source: err,
                }
            })?;

        let confirmation = confirm.await.map_err(|err| HiveError::Publish {
            queue: queue_name.to_owned(),
            source: err,
        })?;

        Ok(!matches!(confirmation, Confirmation::Nack(_)))
    }
}

/// Builds the publish properties for one dispatch.
///
/// Headers merge later-wins: queue publish defaults, then per-call headers,
/// then the injected delay header. Scalar properties prefer the per-call
/// value over the queue default.
fn merged_properties(queue: &QueueConfig, options: &DispatchOptions) -> BasicProperties {
    let mut headers = queue.publish.headers.clone();
    headers.extend(options.headers.clone());

    if let Some(delay_ms) = options.delay_ms {
        headers.insert(
            ShortString::from(AMQP_HEADERS_DELAY),
            AMQPValue::LongLongInt(LongLongInt::from(delay_ms as i64)),
        );
    }

    let mut properties = BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(FieldTable::from(headers));

    if let Some(delivery_mode) = options.delivery_mode.or(queue.publish.delivery_mode) {
        properties = properties.with_delivery_mode(delivery_mode);
    }

    if let Some(priority) = options.priority.or(queue.publish.priority) {
        properties = properties.with_priority(priority);
    }

    if let Some(expiration) = options
        .expiration
        .as_deref()
        .or(queue.publish.expiration.as_deref())
    {
        properties = properties.with_expiration(ShortString::from(expiration));
    }

    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    fn header_of(properties: &BasicProperties, key: &str) -> Option<AMQPValue> {
        properties
            .headers()
            .as_ref()
            .and_then(|headers| headers.inner().get(&ShortString::from(key)).cloned())
    }

    #[test]
    fn per_call_headers_win_over_queue_defaults() {
        let queue = QueueConfig::new("Foo")
            .publish_header("x-origin", AMQPValue::LongString(LongString::from("queue")))
            .publish_header("x-kept", AMQPValue::LongString(LongString::from("default")));
        let options = DispatchOptions::new().header(
            "x-origin",
            AMQPValue::LongString(LongString::from("call")),
        );

        let properties = merged_properties(&queue, &options);

        assert_eq!(
            header_of(&properties, "x-origin"),
            Some(AMQPValue::LongString(LongString::from("call")))
        );
        assert_eq!(
            header_of(&properties, "x-kept"),
            Some(AMQPValue::LongString(LongString::from("default")))
        );
    }

    #[test]
    fn delay_injects_the_delay_header_last() {
        let queue = QueueConfig::new("Foo").publish_header(
            AMQP_HEADERS_DELAY,
            AMQPValue::LongString(LongString::from("bogus")),
        );
        let options = DispatchOptions::new().delay(1_500);

        let properties = merged_properties(&queue, &options);

        assert_eq!(
            header_of(&properties, AMQP_HEADERS_DELAY),
            Some(AMQPValue::LongLongInt(LongLongInt::from(1_500)))
        );
    }

    #[test]
    fn no_delay_header_without_a_delay() {
        let properties = merged_properties(&QueueConfig::new("Foo"), &DispatchOptions::new());
        assert_eq!(header_of(&properties, AMQP_HEADERS_DELAY), None);
    }

    #[test]
    fn scalar_overrides_prefer_the_call_site() {
        let queue = QueueConfig::new("Foo")
            .persistent()
            .publish_priority(1)
            .publish_expiration(10_000);
        let options = DispatchOptions::new().priority(9);

        let properties = merged_properties(&queue, &options);

        assert_eq!(properties.delivery_mode(), &Some(2));
        assert_eq!(properties.priority(), &Some(9));
        assert_eq!(
            properties.expiration(),
            &Some(ShortString::from("10000"))
        );
    }

    #[test]
    fn every_message_is_stamped_json_with_an_id() {
        let properties = merged_properties(&QueueConfig::new("Foo"), &DispatchOptions::new());

        assert_eq!(
            properties.content_type(),
            &Some(ShortString::from(JSON_CONTENT_TYPE))
        );
        assert!(properties.message_id().is_some());
    }
}
