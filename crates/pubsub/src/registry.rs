use crate::error::{ClientError, RegistryServiceError};

use std::collections::HashSet;
use std::sync::Arc;

use swim_registry::{RegistryClient, SubscriptionRecord, TopicRecord};
use tracing::{debug, info};

/// Registry operations in the terms publishers and subscribers use.
///
/// Topics are addressed by name and subscriptions by queue; the registry's
/// numeric ids never leave this type. Every registry failure is turned into a
/// `RegistryServiceError` whose message names the object involved.
pub struct RegistryService<R>
where
    R: RegistryClient,
{
    client: Arc<R>,
}

impl<R> Clone for RegistryService<R>
where
    R: RegistryClient,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<R> RegistryService<R>
where
    R: RegistryClient,
{
    /// Wraps a registry client.
    pub fn new(client: R) -> Self {
        Self::from_arc(Arc::new(client))
    }

    /// Wraps a shared registry client.
    pub const fn from_arc(client: Arc<R>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &R {
        &self.client
    }

    /// Checks the client's credentials.
    ///
    /// # Errors
    ///
    /// Returns the registry failure; a 401 keeps its status.
    pub async fn ping_credentials(&self) -> Result<(), RegistryServiceError> {
        self.client
            .ping_credentials()
            .await
            .map_err(|e| RegistryServiceError::from_api("Error while pinging credentials", &e))
    }

    /// Pings the registry on behalf of a client being created.
    pub(crate) async fn authenticate(&self) -> Result<(), ClientError> {
        match self.ping_credentials().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unauthorized() => Err(ClientError::InvalidCredentials),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every topic in the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the topics cannot be listed.
    pub async fn get_topics(&self) -> Result<Vec<String>, RegistryServiceError> {
        Ok(self
            .topic_records()
            .await?
            .into_iter()
            .map(|topic| topic.name)
            .collect())
    }

    /// Creates a topic.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the registry status; 409 means the topic exists.
    pub async fn create_topic(&self, name: &str) -> Result<TopicRecord, RegistryServiceError> {
        let topic = self.client.post_topic(name).await.map_err(|e| {
            RegistryServiceError::from_api(format!("Error while creating topic {name}"), &e)
        })?;

        debug!("Created topic {} with id {}", topic.name, topic.id);

        Ok(topic)
    }

    /// Creates several topics, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first creation error.
    pub async fn create_topics(&self, names: &[String]) -> Result<(), RegistryServiceError> {
        for name in names {
            self.create_topic(name).await?;
        }

        Ok(())
    }

    /// Deletes a topic, and with it every subscription to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry refuses the deletion.
    pub async fn delete_topic(&self, topic: &TopicRecord) -> Result<(), RegistryServiceError> {
        self.client
            .delete_topic_by_id(topic.id)
            .await
            .map_err(|e| {
                RegistryServiceError::from_api(
                    format!("Error while deleting topic {}", topic.name),
                    &e,
                )
            })
    }

    /// Makes the registry hold exactly the topics in `names`.
    ///
    /// Missing topics are created first, then topics absent from `names` are
    /// deleted. Topics present on both sides are left alone.
    ///
    /// # Errors
    ///
    /// Returns the first registry failure; earlier changes are not rolled back.
    pub async fn sync_topics(&self, names: &[String]) -> Result<(), RegistryServiceError> {
        let registered = self.topic_records().await?;

        let local: HashSet<&str> = names.iter().map(String::as_str).collect();
        let remote: HashSet<&str> = registered.iter().map(|t| t.name.as_str()).collect();

        let mut created = HashSet::new();
        for name in names {
            if !remote.contains(name.as_str()) && created.insert(name.as_str()) {
                self.create_topic(name).await?;
            }
        }

        for topic in registered.iter().filter(|t| !local.contains(t.name.as_str())) {
            self.delete_topic(topic).await?;
        }

        info!("Synchronized {} topics with Subscription Manager", names.len());

        Ok(())
    }

    /// Subscribes to the topic named `topic_name` and returns the new queue.
    ///
    /// # Errors
    ///
    /// Returns an error naming the topic if it is not registered or if the
    /// subscription is refused.
    pub async fn subscribe(&self, topic_name: &str) -> Result<String, RegistryServiceError> {
        let topic = self
            .topic_records()
            .await?
            .into_iter()
            .find(|topic| topic.name == topic_name)
            .ok_or_else(|| {
                RegistryServiceError::new(format!(
                    "{topic_name} is not registered in Subscription Manager"
                ))
            })?;

        let subscription = self
            .client
            .post_subscription(topic.id)
            .await
            .map_err(|e| {
                RegistryServiceError::from_api(
                    format!("Error while subscribing to {topic_name}"),
                    &e,
                )
            })?;

        Ok(subscription.queue)
    }

    /// Deletes the subscription behind `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription owns the queue or the deletion fails.
    pub async fn unsubscribe(&self, queue: &str) -> Result<(), RegistryServiceError> {
        let subscription = self.subscription_by_queue(queue).await?;

        self.client
            .delete_subscription_by_id(subscription.id)
            .await
            .map_err(|e| {
                RegistryServiceError::from_api(
                    format!("Error while deleting subscription '{}'", subscription.id),
                    &e,
                )
            })
    }

    /// Stops delivery into `queue` without deleting it.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription owns the queue or the update fails.
    pub async fn pause(&self, queue: &str) -> Result<(), RegistryServiceError> {
        self.set_active(queue, false).await
    }

    /// Resumes delivery into `queue`.
    ///
    /// # Errors
    ///
    /// Returns an error if no subscription owns the queue or the update fails.
    pub async fn resume(&self, queue: &str) -> Result<(), RegistryServiceError> {
        self.set_active(queue, true).await
    }

    async fn set_active(&self, queue: &str, active: bool) -> Result<(), RegistryServiceError> {
        let mut subscription = self.subscription_by_queue(queue).await?;
        subscription.active = active;

        self.client
            .put_subscription(subscription.id, &subscription)
            .await
            .map_err(|e| {
                RegistryServiceError::from_api(
                    format!("Error while updating subscription '{}'", subscription.id),
                    &e,
                )
            })?;

        Ok(())
    }

    async fn topic_records(&self) -> Result<Vec<TopicRecord>, RegistryServiceError> {
        self.client
            .get_topics()
            .await
            .map_err(|e| RegistryServiceError::from_api("Error while retrieving topics", &e))
    }

    async fn subscription_by_queue(
        &self,
        queue: &str,
    ) -> Result<SubscriptionRecord, RegistryServiceError> {
        self.client
            .get_subscriptions(queue)
            .await
            .map_err(|e| {
                RegistryServiceError::from_api("Error while retrieving subscriptions", &e)
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RegistryServiceError::new(format!("No subscription found for queue '{queue}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use http::StatusCode;
    use swim_registry::ApiError;
    use swim_registry_memory::{Call, MemoryRegistry, Operation};

    fn service() -> (MemoryRegistry, RegistryService<MemoryRegistry>) {
        let registry = MemoryRegistry::new();
        (registry.clone(), RegistryService::new(registry))
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_sync_topics_creates_missing_and_deletes_extra() {
        let (registry, service) = service();
        registry.seed_topic("A");
        let c = registry.seed_topic("C");
        registry.clear_calls();

        service.sync_topics(&names(&["A", "B"])).await.unwrap();

        assert_eq!(
            registry.calls(),
            vec![
                Call::GetTopics,
                Call::PostTopic("B".to_string()),
                Call::DeleteTopic(c.id),
            ]
        );
        assert_eq!(registry.topic_names(), names(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_sync_topics_with_nothing_to_do() {
        let (registry, service) = service();
        registry.seed_topic("A");
        registry.clear_calls();

        service.sync_topics(&names(&["A"])).await.unwrap();

        assert_eq!(registry.calls(), vec![Call::GetTopics]);
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_topic_names_it() {
        let (registry, service) = service();
        registry.seed_topic("weather");

        let error = service.subscribe("traffic").await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "traffic is not registered in Subscription Manager"
        );
        assert!(registry.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_pause_resume_unsubscribe() {
        let (registry, service) = service();
        registry.seed_topic("weather");

        let queue = service.subscribe("weather").await.unwrap();
        assert_eq!(registry.subscriptions()[0].queue, queue);

        service.pause(&queue).await.unwrap();
        assert!(!registry.subscriptions()[0].active);

        service.resume(&queue).await.unwrap();
        assert!(registry.subscriptions()[0].active);

        service.unsubscribe(&queue).await.unwrap();
        assert!(registry.subscriptions().is_empty());

        assert_eq!(
            service.pause(&queue).await.unwrap_err().to_string(),
            format!("No subscription found for queue '{queue}'")
        );
    }

    #[tokio::test]
    async fn test_create_topic_keeps_the_status() {
        let (registry, service) = service();
        registry.seed_topic("weather");

        let error = service.create_topic("weather").await.unwrap_err();
        assert!(error.is_conflict());
        assert!(error.message().starts_with("Error while creating topic weather"));

        registry.fail_next(
            Operation::PostTopic,
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        );
        let error = service.create_topic("traffic").await.unwrap_err();
        assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!error.is_conflict());
    }

    #[tokio::test]
    async fn test_create_topics_stops_at_first_failure() {
        let (registry, service) = service();
        registry.seed_topic("B");
        registry.clear_calls();

        assert_matches!(
            service.create_topics(&names(&["A", "B", "C"])).await,
            Err(e) if e.is_conflict()
        );
        assert_eq!(registry.topic_names(), names(&["B", "A"]));
    }

    #[tokio::test]
    async fn test_failed_subscription_update_names_it() {
        let (registry, service) = service();
        registry.seed_topic("weather");
        let queue = service.subscribe("weather").await.unwrap();
        let id = registry.subscriptions()[0].id;

        registry.fail_next(
            Operation::PutSubscription,
            ApiError::new(StatusCode::BAD_REQUEST, "invalid"),
        );

        let error = service.pause(&queue).await.unwrap_err();
        assert_eq!(
            error.to_string(),
            format!("Error while updating subscription '{id}': [400] - invalid")
        );
    }
}
