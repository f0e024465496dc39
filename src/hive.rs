// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Hive Facade
//!
//! The [`Hive`] owns the broker channel and topology and is the factory for
//! dispatchers and workers. It tracks every consumer created through any of
//! its workers so that [`Hive::destroy`] can cancel them all before
//! releasing the channels.

use crate::{
    channel,
    config::HiveConfig,
    dispatcher::Dispatcher,
    errors::HiveError,
    registry::ConsumerRegistry,
    topology::{self, ExchangePair},
    worker::{self, QueueHandlers, Worker},
};
use futures_util::future::join_all;
use lapin::{options::BasicCancelOptions, Channel, Connection};
use std::sync::Arc;
use tracing::debug;

/// Orchestrates a fixed exchange/queue topology on one broker connection.
///
/// Construction declares the topology; [`Hive::dispatcher`] and
/// [`Hive::create_worker`] hand out producers and consumers over it. The
/// connection stays caller-owned and is never closed by the hive.
pub struct Hive {
    connection: Arc<Connection>,
    channel: Arc<Channel>,
    config: Arc<HiveConfig>,
    exchanges: ExchangePair,
    registry: ConsumerRegistry,
}

impl Hive {
    /// Opens a channel on the connection and declares the exchange pair and
    /// every configured queue. Any declaration failure fails construction
    /// entirely; no partial hive is returned.
    pub async fn new(connection: Arc<Connection>, config: HiveConfig) -> Result<Hive, HiveError> {
        let channel = Arc::new(channel::create_channel(&connection).await?);
        let exchanges = topology::declare_topology(&channel, &config).await?;

        Ok(Hive {
            connection,
            channel,
            config: Arc::new(config),
            exchanges,
            registry: ConsumerRegistry::new(),
        })
    }

    /// Creates a dispatcher publishing over this hive's channel.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.channel.clone(),
            self.config.clone(),
            self.exchanges.clone(),
        )
    }

    /// Registers one consumer per queue in `handlers` and returns the
    /// resulting worker. Each consumer is recorded in the hive's registry
    /// for coordinated teardown.
    ///
    /// At most one consumer may exist per queue on one hive; a second
    /// registration for the same queue fails with
    /// [`HiveError::ConsumerAlreadyRegistered`].
    pub async fn create_worker(&self, handlers: QueueHandlers) -> Result<Worker, HiveError> {
        worker::register_all(&self.connection, &self.config, &self.registry, handlers).await
    }

    /// The connection the hive was built on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The hive's topology and publish channel, for advanced use.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// The names of the declared exchange pair.
    pub fn exchanges(&self) -> &ExchangePair {
        &self.exchanges
    }

    /// Cancels every tracked consumer, closes the consumer channels, then
    /// closes the hive's own channel. The connection stays open.
    ///
    /// Handlers already running keep their prefetch slot until they finish
    /// and may still settle their delivery. Calling `create_worker`
    /// concurrently with `destroy` is a caller error: registrations started
    /// after cancellation begins are not guaranteed to be cancelled.
    pub async fn destroy(&self) -> Result<(), HiveError> {
        let consumers = self.registry.drain();

        let cancellations = consumers.into_iter().map(|consumer| async move {
            debug!(
                "cancelling consumer: {} on queue: {}",
                consumer.tag, consumer.queue
            );

            consumer
                .channel
                .basic_cancel(&consumer.tag, BasicCancelOptions::default())
                .await
                .map_err(|err| HiveError::CancelConsumer {
                    tag: consumer.tag.clone(),
                    source: err,
                })?;

            consumer
                .channel
                .close(200, "consumer channel released")
                .await
                .map_err(HiveError::CloseChannel)
        });

        join_all(cancellations)
            .await
            .into_iter()
            .collect::<Result<Vec<()>, HiveError>>()?;

        self.channel
            .close(200, "hive destroyed")
            .await
            .map_err(HiveError::CloseChannel)
    }
}
