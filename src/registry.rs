// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Registry
//!
//! The hive-owned record of every consumer created through any worker the
//! hive spawned. Entries are appended as registrations complete and drained
//! only during teardown, when each tracked consumer is cancelled and its
//! channel closed.
//!
//! The registry also enforces exactly-once consumer registration per queue:
//! a queue name is reserved before its broker registration starts, and a
//! second reservation fails.

use crate::errors::HiveError;
use lapin::Channel;
use std::{collections::HashSet, sync::Mutex};

/// One live consumer: the queue it consumes, the broker-assigned tag used to
/// cancel it, and the channel it was registered on.
pub(crate) struct TrackedConsumer {
    pub(crate) queue: String,
    pub(crate) tag: String,
    pub(crate) channel: Channel,
}

#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    queues: HashSet<String>,
    consumers: Vec<TrackedConsumer>,
}

impl ConsumerRegistry {
    pub(crate) fn new() -> ConsumerRegistry {
        ConsumerRegistry::default()
    }

    /// Claims a queue for a registration about to start. Fails when the
    /// queue already has a consumer on this hive.
    pub(crate) fn reserve(&self, queue: &str) -> Result<(), HiveError> {
        let mut inner = self.inner.lock().expect("consumer registry poisoned");
        if !inner.queues.insert(queue.to_owned()) {
            return Err(HiveError::ConsumerAlreadyRegistered(queue.to_owned()));
        }
        Ok(())
    }

    /// Gives a reservation back after a failed registration, so the queue
    /// can be registered again.
    pub(crate) fn release(&self, queue: &str) {
        let mut inner = self.inner.lock().expect("consumer registry poisoned");
        inner.queues.remove(queue);
    }

    /// Records a completed registration under an existing reservation.
    pub(crate) fn record(&self, consumer: TrackedConsumer) {
        let mut inner = self.inner.lock().expect("consumer registry poisoned");
        inner.consumers.push(consumer);
    }

    /// Takes every tracked consumer out of the registry and clears the
    /// reservations. Called once, from teardown.
    pub(crate) fn drain(&self) -> Vec<TrackedConsumer> {
        let mut inner = self.inner.lock().expect("consumer registry poisoned");
        inner.queues.clear();
        std::mem::take(&mut inner.consumers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_queue_can_only_be_reserved_once() {
        let registry = ConsumerRegistry::new();

        assert!(registry.reserve("Foo").is_ok());
        assert!(matches!(
            registry.reserve("Foo"),
            Err(HiveError::ConsumerAlreadyRegistered(queue)) if queue == "Foo"
        ));
        assert!(registry.reserve("Bar").is_ok());
    }

    #[test]
    fn releasing_makes_a_queue_reservable_again() {
        let registry = ConsumerRegistry::new();

        registry.reserve("Foo").unwrap();
        registry.release("Foo");

        assert!(registry.reserve("Foo").is_ok());
    }

    #[test]
    fn draining_clears_reservations() {
        let registry = ConsumerRegistry::new();

        registry.reserve("Foo").unwrap();
        assert!(registry.drain().is_empty());

        // after teardown the queue may be registered on a fresh worker
        assert!(registry.reserve("Foo").is_ok());
    }
}
