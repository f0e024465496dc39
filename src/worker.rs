// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Worker Registration
//!
//! A worker turns a mapping of queue names to handlers into live consumers.
//! Each queue gets its own channel so its prefetch limit applies to that
//! queue alone, a consumer registered with the queue name as subscription,
//! and a spawned consumption loop.
//!
//! Registrations in one batch run concurrently. A failing queue wraps its
//! cause into [`HiveError::ConsumerInit`] and fails the overall call, but
//! sibling registrations that succeeded stay registered; the hive's registry
//! still tracks them for teardown.

use crate::{
    config::HiveConfig,
    consumer::spawn_consumer_loop,
    errors::HiveError,
    handler::MessageHandler,
    registry::{ConsumerRegistry, TrackedConsumer},
};
use futures_util::future::join_all;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Connection,
};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Per-queue consume options.
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub(crate) prefetch_count: u16,
    pub(crate) exclusive: bool,
}

impl Default for ConsumeOptions {
    fn default() -> Self {
        ConsumeOptions {
            prefetch_count: 1,
            exclusive: false,
        }
    }
}

impl ConsumeOptions {
    pub fn new() -> ConsumeOptions {
        ConsumeOptions::default()
    }

    /// Maximum number of unacknowledged deliveries pushed to this queue's
    /// consumer before the broker pauses delivery. Defaults to 1.
    pub fn prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = count;
        self
    }

    /// Requests exclusive consumption of the queue.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// The queue-to-handler mapping a worker is created from.
#[derive(Default)]
pub struct QueueHandlers {
    pub(crate) entries: HashMap<String, QueueHandlerEntry>,
}

pub(crate) struct QueueHandlerEntry {
    pub(crate) options: ConsumeOptions,
    pub(crate) handler: Arc<dyn MessageHandler>,
}

impl QueueHandlers {
    pub fn new() -> QueueHandlers {
        QueueHandlers::default()
    }

    /// Registers a handler for a queue with default consume options.
    pub fn on(self, queue: &str, handler: Arc<dyn MessageHandler>) -> Self {
        self.on_with(queue, ConsumeOptions::default(), handler)
    }

    /// Registers a handler for a queue with explicit consume options.
    pub fn on_with(
        mut self,
        queue: &str,
        options: ConsumeOptions,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.entries
            .insert(queue.to_owned(), QueueHandlerEntry { options, handler });
        self
    }
}

/// A set of registered consumers, one per queue key supplied to
/// [`crate::hive::Hive::create_worker`].
pub struct Worker {
    consumers: HashMap<String, String>,
}

impl Worker {
    /// The broker-assigned consumer tag for a queue of this worker.
    pub fn consumer_tag(&self, queue: &str) -> Option<&str> {
        self.consumers.get(queue).map(String::as_str)
    }

    /// The queues this worker consumes.
    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.consumers.keys().map(String::as_str)
    }
}

/// Every supplied queue must exist in the hive's configuration. Violating
/// this is a programmer error, surfaced before any broker call.
pub(crate) fn validate_queues(
    config: &HiveConfig,
    handlers: &QueueHandlers,
) -> Result<(), HiveError> {
    for queue in handlers.entries.keys() {
        if config.queue_config(queue).is_none() {
            return Err(HiveError::UnknownQueue(queue.clone()));
        }
    }
    Ok(())
}

pub(crate) async fn register_all(
    connection: &Connection,
    config: &HiveConfig,
    registry: &ConsumerRegistry,
    handlers: QueueHandlers,
) -> Result<Worker, HiveError> {
    validate_queues(config, &handlers)?;

    // Claim every queue before touching the broker. On a conflict the claims
    // made by this call are given back; queues registered by earlier calls
    // are untouched.
    let mut reserved: Vec<&String> = Vec::with_capacity(handlers.entries.len());
    for queue in handlers.entries.keys() {
        if let Err(err) = registry.reserve(queue) {
            for claimed in reserved {
                registry.release(claimed);
            }
            return Err(err);
        }
        reserved.push(queue);
    }

    let registrations = handlers
        .entries
        .into_iter()
        .map(|(queue, entry)| async move {
            register_queue(connection, queue, entry).await
        });

    let mut consumers = HashMap::new();
    let mut first_failure = None;

    for result in join_all(registrations).await {
        match result {
            Ok(consumer) => {
                consumers.insert(consumer.queue.clone(), consumer.tag.clone());
                registry.record(consumer);
            }
            Err((queue, err)) => {
                registry.release(&queue);
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(Worker { consumers }),
    }
}

async fn register_queue(
    connection: &Connection,
    queue: String,
    entry: QueueHandlerEntry,
) -> Result<TrackedConsumer, (String, HiveError)> {
    let init_error = |err: lapin::Error| {
        (
            queue.clone(),
            HiveError::ConsumerInit {
                queue: queue.clone(),
                source: err,
            },
        )
    };

    let channel = connection.create_channel().await.map_err(init_error)?;

    channel
        .basic_qos(entry.options.prefetch_count, BasicQosOptions::default())
        .await
        .map_err(init_error)?;

    let consumer = channel
        .basic_consume(
            &queue,
            "",
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: entry.options.exclusive,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(init_error)?;

    let tag = consumer.tag().to_string();
    debug!("consumer registered on queue: {} tag: {}", queue, tag);

    spawn_consumer_loop(queue.clone(), consumer, entry.handler);

    Ok(TrackedConsumer {
        queue,
        tag,
        channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::handler::MockMessageHandler;

    #[test]
    fn consume_options_default_to_a_prefetch_of_one() {
        let options = ConsumeOptions::new();
        assert_eq!(options.prefetch_count, 1);
        assert!(!options.exclusive);

        let tuned = ConsumeOptions::new().prefetch_count(16).exclusive();
        assert_eq!(tuned.prefetch_count, 16);
        assert!(tuned.exclusive);
    }

    #[test]
    fn registration_fails_fast_for_an_unconfigured_queue() {
        let config = HiveConfig::new().queue(QueueConfig::new("Foo"));
        let handlers = QueueHandlers::new()
            .on("Foo", Arc::new(MockMessageHandler::new()))
            .on("Baz", Arc::new(MockMessageHandler::new()));

        assert!(matches!(
            validate_queues(&config, &handlers),
            Err(HiveError::UnknownQueue(queue)) if queue == "Baz"
        ));
    }

    #[test]
    fn every_configured_queue_passes_validation() {
        let config = HiveConfig::new()
            .queue(QueueConfig::new("Foo"))
            .queue(QueueConfig::new("Bar").delayed());
        let handlers = QueueHandlers::new()
            .on("Foo", Arc::new(MockMessageHandler::new()))
            .on("Bar", Arc::new(MockMessageHandler::new()));

        assert!(validate_queues(&config, &handlers).is_ok());
    }

    #[test]
    fn a_second_entry_for_the_same_queue_replaces_the_first() {
        let handlers = QueueHandlers::new()
            .on("Foo", Arc::new(MockMessageHandler::new()))
            .on_with(
                "Foo",
                ConsumeOptions::new().prefetch_count(8),
                Arc::new(MockMessageHandler::new()),
            );

        assert_eq!(handlers.entries.len(), 1);
        assert_eq!(handlers.entries["Foo"].options.prefetch_count, 8);
    }
}
