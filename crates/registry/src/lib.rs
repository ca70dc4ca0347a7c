//! Abstract interface for the Subscription Manager, the registry of topics and
//! subscriptions.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod model;

pub use error::ApiError;
pub use model::{SubscriptionRecord, TopicRecord};

use async_trait::async_trait;

/// Client for the registry's REST API.
///
/// Every call may fail with an `ApiError` carrying the HTTP status: 401 for bad
/// credentials, 404 for unknown records, 409 when a record already exists.
#[async_trait]
pub trait RegistryClient
where
    Self: Send + Sync + 'static,
{
    /// Checks the client's credentials.
    async fn ping_credentials(&self) -> Result<(), ApiError>;

    /// Lists every topic known to the registry.
    async fn get_topics(&self) -> Result<Vec<TopicRecord>, ApiError>;

    /// Creates a topic.
    async fn post_topic(&self, name: &str) -> Result<TopicRecord, ApiError>;

    /// Deletes a topic and, with it, its subscriptions.
    async fn delete_topic_by_id(&self, topic_id: u64) -> Result<(), ApiError>;

    /// Subscribes to a topic. The registry issues a fresh queue.
    async fn post_subscription(&self, topic_id: u64) -> Result<SubscriptionRecord, ApiError>;

    /// Lists the subscriptions attached to `queue`.
    async fn get_subscriptions(&self, queue: &str) -> Result<Vec<SubscriptionRecord>, ApiError>;

    /// Replaces a subscription record.
    async fn put_subscription(
        &self,
        subscription_id: u64,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, ApiError>;

    /// Deletes a subscription and its queue.
    async fn delete_subscription_by_id(&self, subscription_id: u64) -> Result<(), ApiError>;
}
