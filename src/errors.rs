// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! This module provides the error surface for the hive. The `HiveError` enum
//! covers every setup-time and dispatch-time failure: connection and channel
//! creation, exchange/queue declaration and binding, publishing, consumer
//! registration, and teardown.
//!
//! Per-message handler failures are deliberately NOT represented here: they
//! are contained by the consumption loop and translated into a single
//! negative-acknowledgement of the affected delivery, never surfaced to the
//! worker's caller.

use thiserror::Error;

/// Errors returned by hive construction, dispatch, worker registration and
/// teardown. Each broker-backed variant carries the underlying `lapin` error
/// as its source.
#[derive(Error, Debug)]
pub enum HiveError {
    /// Error establishing a connection to the broker
    #[error("failure to connect to the broker")]
    Connect(#[source] lapin::Error),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    Channel(#[source] lapin::Error),

    /// Error declaring an exchange
    #[error("failure to declare the exchange `{name}`")]
    DeclareExchange {
        name: String,
        #[source]
        source: lapin::Error,
    },

    /// Error declaring a queue
    #[error("failure to declare the queue `{name}`")]
    DeclareQueue {
        name: String,
        #[source]
        source: lapin::Error,
    },

    /// Error binding a queue to an exchange
    #[error("failure to bind the queue `{queue}` to the exchange `{exchange}`")]
    BindQueue {
        queue: String,
        exchange: String,
        #[source]
        source: lapin::Error,
    },

    /// A queue name was used that is not part of the hive's configuration.
    /// This is a programmer error and is raised before any broker call.
    #[error("the queue `{0}` is not configured on this hive")]
    UnknownQueue(String),

    /// Error serializing a dispatch payload to JSON
    #[error("failure to serialize the payload for the queue `{queue}`")]
    SerializePayload {
        queue: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error publishing a message
    #[error("failure to publish to the queue `{queue}`")]
    Publish {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// Error initializing a consumer for a queue, wrapping the failing
    /// channel, prefetch or consume call
    #[error("failed to initialize consumer for queue `{queue}`")]
    ConsumerInit {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// A second consumer registration was attempted for a queue that already
    /// has one on this hive
    #[error("a consumer is already registered for the queue `{0}` on this hive")]
    ConsumerAlreadyRegistered(String),

    /// Error cancelling a consumer during teardown
    #[error("failure to cancel the consumer `{tag}`")]
    CancelConsumer {
        tag: String,
        #[source]
        source: lapin::Error,
    },

    /// Error closing a channel during teardown
    #[error("failure to close the channel")]
    CloseChannel(#[source] lapin::Error),
}

/// The error type message handlers may fail with.
///
/// The consumption loop never inspects the error beyond the fact that it
/// occurred: any `Err` results in a single nack of the delivery. Payload
/// deserialization failures inside typed handlers surface through this same
/// type and follow the same path.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_queue_names_the_queue() {
        let err = HiveError::UnknownQueue("Foo".to_owned());
        assert_eq!(
            err.to_string(),
            "the queue `Foo` is not configured on this hive"
        );
    }

    #[test]
    fn consumer_init_exposes_the_underlying_cause() {
        let err = HiveError::ConsumerInit {
            queue: "Bar".to_owned(),
            source: lapin::Error::ChannelsLimitReached,
        };
        assert_eq!(
            err.to_string(),
            "failed to initialize consumer for queue `Bar`"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
