// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! This module defines the seam between the hive and user code: the
//! [`MessageHandler`] trait invoked once per delivery, and [`json_handler`],
//! the typed adapter that decodes the JSON wire payload before calling a
//! plain async function.
//!
//! Handler state (database pools, API clients, any fixed context) is
//! injected at handler construction and captured by the handler value; only
//! the [`DeliveryContext`] varies per message.

use crate::errors::HandlerError;
use async_trait::async_trait;
use lapin::{message::Delivery, BasicProperties};
use serde::de::DeserializeOwned;
use std::{future::Future, marker::PhantomData, sync::Arc};

/// Per-delivery metadata handed to the handler alongside the payload.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: BasicProperties,
}

impl DeliveryContext {
    pub(crate) fn from_delivery(queue: &str, delivery: &Delivery) -> DeliveryContext {
        DeliveryContext {
            queue: queue.to_owned(),
            exchange: delivery.exchange.to_string(),
            routing_key: delivery.routing_key.to_string(),
            redelivered: delivery.redelivered,
            properties: delivery.properties.clone(),
        }
    }
}

/// A handler invoked once per delivery of its queue.
///
/// The outcome drives the acknowledgement decision: `Ok` acknowledges the
/// delivery, `Err` negative-acknowledges it without requeue. Nothing else
/// about the return value matters; a handler cannot influence redelivery or
/// produce a reply through this trait.
///
/// Deliveries of different messages may be handled concurrently, bounded by
/// the queue's prefetch. Implementations must be safe under that
/// concurrency.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8], context: DeliveryContext) -> Result<(), HandlerError>;
}

/// Wraps an async function taking a deserialized payload into a
/// [`MessageHandler`].
///
/// The wire payload is decoded as UTF-8 JSON into `P` before the function
/// runs. A decode failure fails the delivery the same way a handler error
/// does; the two are not distinguished at this layer.
///
/// # Example
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct Greeting { name: String }
///
/// let handler = json_handler(|greeting: Greeting, _ctx| async move {
///     println!("hello {}", greeting.name);
///     Ok(())
/// });
/// ```
pub fn json_handler<P, F, Fut>(handler: F) -> Arc<dyn MessageHandler>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, DeliveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(JsonHandler {
        handler,
        payload: PhantomData,
    })
}

struct JsonHandler<P, F> {
    handler: F,
    payload: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P, F, Fut> MessageHandler for JsonHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, DeliveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, payload: &[u8], context: DeliveryContext) -> Result<(), HandlerError> {
        let value: P = serde_json::from_slice(payload)?;
        (self.handler)(value, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_for(queue: &str) -> DeliveryContext {
        DeliveryContext {
            queue: queue.to_owned(),
            exchange: "amqp-hive-direct".to_owned(),
            routing_key: queue.to_owned(),
            redelivered: false,
            properties: BasicProperties::default(),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct FooPayload {
        foo_count: i64,
    }

    #[tokio::test]
    async fn decodes_the_payload_before_invoking_the_function() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let seen = invocations.clone();

        let handler = json_handler(move |payload: FooPayload, context| {
            let seen = seen.clone();
            async move {
                assert_eq!(payload, FooPayload { foo_count: 42 });
                assert_eq!(context.queue, "Foo");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let result = handler
            .handle(br#"{"foo_count":42}"#, context_for("Foo"))
            .await;

        assert!(result.is_ok());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_json_fails_without_invoking_the_function() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let seen = invocations.clone();

        let handler = json_handler(move |_payload: FooPayload, _context| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let result = handler.handle(b"not json at all", context_for("Foo")).await;

        assert!(result.is_err());
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn function_errors_pass_through() {
        let handler = json_handler(|_payload: FooPayload, _context| async move {
            Err::<(), HandlerError>("boom".into())
        });

        let result = handler
            .handle(br#"{"foo_count":1}"#, context_for("Foo"))
            .await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
