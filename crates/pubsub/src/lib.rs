//! Publish/subscribe clients for SWIM data exchange.
//!
//! Publishers register topics in the Subscription Manager and push their data to
//! the broker's topic exchange, on demand or on a timer. Subscribers obtain a
//! queue per subscribed topic from the Subscription Manager and consume it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod app;
mod config;
mod error;
mod handler;
mod registry;

/// Publisher client and broker handler.
pub mod publisher;

/// Subscriber client, broker handler and message consumers.
pub mod subscriber;

pub use app::{App, PubApp, SubApp};
pub use config::{AppConfig, DEFAULT_SM_BASE_PATH, LoggingConfig, RegistryConfig};
pub use error::{
    AppError, BoxError, BrokerHandlerError, ClientError, ConfigError, DataConsumerError,
    RegistryServiceError,
};
pub use handler::BrokerHandler;
pub use publisher::{Publisher, PublisherBrokerHandler};
pub use registry::RegistryService;
pub use subscriber::{
    MessageConsumer, Subscriber, SubscriberBrokerHandler, consumer_async_fn, consumer_fn,
};
