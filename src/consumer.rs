// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumption
//!
//! The per-queue consumption loop. Each delivery goes through exactly one
//! handler invocation and is settled exactly once: an ack when the handler
//! succeeds, a nack without requeue when it fails. There is no retry,
//! backoff or redelivery at this layer; a failing handler permanently drops
//! the delivery from the queue's normal flow (a dead-letter path only exists
//! if the broker topology defines one).

use crate::handler::{DeliveryContext, MessageHandler};
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Spawns the consumption task for one registered queue.
///
/// The task runs until the consumer stream ends, which happens when the
/// consumer is cancelled, by teardown or by the broker. A broker-initiated
/// cancellation simply closes the stream: no handler invocation, nothing to
/// acknowledge.
pub(crate) fn spawn_consumer_loop(
    queue: String,
    mut consumer: Consumer,
    handler: Arc<dyn MessageHandler>,
) {
    tokio::spawn(async move {
        while let Some(attempt) = consumer.next().await {
            match attempt {
                Ok(delivery) => process_delivery(&queue, handler.as_ref(), delivery).await,
                Err(err) => {
                    error!(
                        queue = queue.as_str(),
                        error = err.to_string(),
                        "failure receiving a delivery"
                    )
                }
            }
        }

        debug!(queue = queue.as_str(), "consumer stream closed");
    });
}

/// Runs the handler for one delivery and settles it.
///
/// Handler errors are not logged here; reporting them is the handler's
/// responsibility. Only a failing ack/nack submission is, since the handler
/// never sees it.
async fn process_delivery(queue: &str, handler: &dyn MessageHandler, delivery: Delivery) {
    let context = DeliveryContext::from_delivery(queue, &delivery);

    match handler.handle(&delivery.data, context).await {
        Ok(()) => {
            if let Err(err) = delivery.ack(BasicAckOptions { multiple: false }).await {
                error!(
                    queue = queue,
                    error = err.to_string(),
                    "error to ack the delivery"
                );
            }
        }
        Err(_) => {
            if let Err(err) = delivery
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: false,
                })
                .await
            {
                error!(
                    queue = queue,
                    error = err.to_string(),
                    "error to nack the delivery"
                );
            }
        }
    }
}
