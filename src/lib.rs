// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;
mod registry;

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod hive;
pub mod topology;
pub mod worker;

pub use channel::connect;
pub use config::{ExchangeConfig, HiveConfig, QueueConfig};
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use errors::{HandlerError, HiveError};
pub use handler::{json_handler, DeliveryContext, MessageHandler};
pub use hive::Hive;
pub use worker::{ConsumeOptions, QueueHandlers, Worker};
