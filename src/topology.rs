// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! This module declares the fixed topology every hive lives in: one direct
//! exchange, one delayed exchange (backed by the `x-delayed-message` plugin)
//! and one queue per configured name, each bound to the exchange matching its
//! delayed flag with the queue name as routing key.
//!
//! Declarations are idempotent at the broker: several hives pointed at the
//! same broker may declare the same topology without error, as long as the
//! properties match. Any single failure fails the whole setup.

use crate::{
    config::{ExchangeConfig, HiveConfig, QueueConfig},
    errors::HiveError,
};
use futures_util::future::join_all;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable, LongInt, LongString, ShortString},
    Channel,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Default name of the direct exchange
pub const DEFAULT_DIRECT_EXCHANGE: &str = "amqp-hive-direct";
/// Default name of the delayed exchange
pub const DEFAULT_DELAYED_EXCHANGE: &str = "amqp-hive-delayed";
/// Exchange kind provided by the delayed-message broker plugin
pub const DELAYED_MESSAGE_EXCHANGE_KIND: &str = "x-delayed-message";
/// Constant for the argument selecting the delayed exchange's internal
/// routing mode
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// The names of the two exchanges a hive publishes through. Exactly one pair
/// exists per hive, created during construction and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ExchangePair {
    pub direct: String,
    pub delayed: String,
}

impl ExchangePair {
    /// The exchange a dispatch for this queue routes through, decided by the
    /// queue's static delayed flag.
    pub(crate) fn for_queue(&self, queue: &QueueConfig) -> &str {
        if queue.is_delayed {
            &self.delayed
        } else {
            &self.direct
        }
    }
}

/// Declares the exchange pair and every configured queue, binding each queue
/// to its exchange with the queue name as routing key.
///
/// Queue declarations and bindings run concurrently; the call waits for all
/// of them and fails if any single one fails.
pub(crate) async fn declare_topology(
    channel: &Channel,
    config: &HiveConfig,
) -> Result<ExchangePair, HiveError> {
    declare_exchange(
        channel,
        &config.direct_exchange,
        lapin::ExchangeKind::Direct,
        config.direct_exchange.arguments.clone(),
    )
    .await?;

    declare_exchange(
        channel,
        &config.delayed_exchange,
        lapin::ExchangeKind::Custom(DELAYED_MESSAGE_EXCHANGE_KIND.to_owned()),
        delayed_exchange_arguments(&config.delayed_exchange.arguments),
    )
    .await?;

    let pair = ExchangePair {
        direct: config.direct_exchange.name.clone(),
        delayed: config.delayed_exchange.name.clone(),
    };

    let declarations = config
        .queues
        .values()
        .map(|queue| declare_and_bind_queue(channel, queue, &pair));

    join_all(declarations)
        .await
        .into_iter()
        .collect::<Result<Vec<()>, HiveError>>()?;

    Ok(pair)
}

/// Arguments for the delayed exchange, with its internal routing mode forced
/// to `direct` regardless of any user override.
fn delayed_exchange_arguments(
    user_arguments: &BTreeMap<ShortString, AMQPValue>,
) -> BTreeMap<ShortString, AMQPValue> {
    let mut arguments = user_arguments.clone();
    arguments.insert(
        ShortString::from(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE),
        AMQPValue::LongString(LongString::from("direct")),
    );
    arguments
}

async fn declare_exchange(
    channel: &Channel,
    def: &ExchangeConfig,
    kind: lapin::ExchangeKind,
    arguments: BTreeMap<ShortString, AMQPValue>,
) -> Result<(), HiveError> {
    debug!("creating exchange: {}", def.name);

    channel
        .exchange_declare(
            &def.name,
            kind,
            ExchangeDeclareOptions {
                passive: false,
                durable: def.durable,
                auto_delete: def.auto_delete,
                internal: false,
                nowait: false,
            },
            FieldTable::from(arguments),
        )
        .await
        .map_err(|err| HiveError::DeclareExchange {
            name: def.name.clone(),
            source: err,
        })?;

    debug!("exchange: {} was created", def.name);
    Ok(())
}

/// Declare-time arguments for a queue, built from its optional limits.
fn queue_arguments(queue: &QueueConfig) -> BTreeMap<ShortString, AMQPValue> {
    let mut arguments = BTreeMap::new();

    if let Some(ttl) = queue.ttl {
        arguments.insert(
            ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
            AMQPValue::LongInt(LongInt::from(ttl)),
        );
    }

    if let Some(max) = queue.max_length {
        arguments.insert(
            ShortString::from(AMQP_HEADERS_MAX_LENGTH),
            AMQPValue::LongInt(LongInt::from(max)),
        );
    }

    if let Some(max_bytes) = queue.max_length_bytes {
        arguments.insert(
            ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES),
            AMQPValue::LongInt(LongInt::from(max_bytes)),
        );
    }

    arguments
}

async fn declare_and_bind_queue(
    channel: &Channel,
    queue: &QueueConfig,
    exchanges: &ExchangePair,
) -> Result<(), HiveError> {
    debug!("creating queue: {}", queue.name);

    channel
        .queue_declare(
            &queue.name,
            QueueDeclareOptions {
                passive: false,
                durable: queue.durable,
                exclusive: queue.exclusive,
                auto_delete: queue.auto_delete,
                nowait: false,
            },
            FieldTable::from(queue_arguments(queue)),
        )
        .await
        .map_err(|err| HiveError::DeclareQueue {
            name: queue.name.clone(),
            source: err,
        })?;

    let exchange = exchanges.for_queue(queue);

    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        queue.name, exchange, queue.name
    );

    channel
        .queue_bind(
            &queue.name,
            exchange,
            &queue.name,
            QueueBindOptions { nowait: false },
            FieldTable::default(),
        )
        .await
        .map_err(|err| HiveError::BindQueue {
            queue: queue.name.clone(),
            exchange: exchange.to_owned(),
            source: err,
        })?;

    debug!("queue: {} was bound", queue.name);
    Ok(())
}
