mod handler;

pub use handler::PublisherBrokerHandler;

use crate::error::{BrokerHandlerError, ClientError};
use crate::registry::RegistryService;

use std::collections::BTreeMap;
use std::sync::Arc;

use swim_broker::Connector;
use swim_registry::RegistryClient;
use swim_topics::{Context, DispatchOutcome, TopicKind};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

/// Registers topics with the registry and publishes them through a handler.
pub struct Publisher<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    handler: PublisherBrokerHandler<C>,
    id: Uuid,
    registry: RegistryService<R>,
    topics: Arc<Mutex<BTreeMap<String, TopicKind>>>,
}

impl<C, R> std::fmt::Debug for Publisher<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<C, R> Clone for Publisher<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            id: self.id,
            registry: self.registry.clone(),
            topics: self.topics.clone(),
        }
    }
}

impl<C, R> Publisher<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    /// Creates a publisher after checking its credentials with the registry.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidCredentials` on a 401 and
    /// `ClientError::Registry` on any other registry failure.
    pub async fn connect(
        handler: PublisherBrokerHandler<C>,
        registry: RegistryService<R>,
    ) -> Result<Self, ClientError> {
        registry.authenticate().await?;

        Ok(Self {
            handler,
            id: Uuid::new_v4(),
            registry,
            topics: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Identifies the publisher within an app.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The handler publishing this client's topics.
    #[must_use]
    pub const fn handler(&self) -> &PublisherBrokerHandler<C> {
        &self.handler
    }

    /// Registers `topic` with the registry, then hands it to the handler.
    ///
    /// A topic the registry already knows (409) is accepted as is.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::DuplicateTopic` if this publisher already holds a
    /// topic with the same id, and `ClientError::Registry` on any other registry
    /// failure; the topic is then not added. Returns
    /// `ClientError::BrokerHandler` if the handler's loop has already exited, in
    /// which case the registry is left untouched.
    pub async fn register_topic(&self, topic: impl Into<TopicKind>) -> Result<(), ClientError> {
        let topic = topic.into();
        let mut topics = self.topics.lock().await;

        if topics.contains_key(topic.id()) {
            return Err(ClientError::DuplicateTopic(topic.id().to_string()));
        }

        if !self.handler.accepts_topics() {
            return Err(BrokerHandlerError::NotRunning.into());
        }

        let created = match self.registry.create_topic(topic.id()).await {
            Ok(record) => Some(record),
            Err(e) if e.is_conflict() => {
                info!("Topic {} already exists in Subscription Manager", topic.id());
                None
            }
            Err(e) => {
                error!("Error while accessing Subscription Manager: {}", e);
                return Err(e.into());
            }
        };

        if let Err(e) = self.handler.add_topic(topic.clone()) {
            if let Some(record) = created {
                if let Err(cleanup) = self.registry.delete_topic(&record).await {
                    error!("{}", cleanup);
                }
            }
            return Err(e.into());
        }
        topics.insert(topic.id().to_string(), topic);

        Ok(())
    }

    /// Ids of the registered topics, sorted.
    pub async fn topics(&self) -> Vec<String> {
        self.topics.lock().await.keys().cloned().collect()
    }

    /// Publishes a registered topic on demand.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownTopic` if no topic has this id, or the
    /// handler error if the handler cannot send.
    pub async fn publish_topic(
        &self,
        topic_id: &str,
        context: Context,
    ) -> Result<DispatchOutcome, ClientError> {
        let topic = self
            .topics
            .lock()
            .await
            .get(topic_id)
            .map(|topic| topic.topic().clone())
            .ok_or_else(|| ClientError::UnknownTopic(topic_id.to_string()))?;

        Ok(self.handler.trigger_topic(&topic, context).await?)
    }

    /// Makes the registry hold exactly this publisher's topics.
    ///
    /// # Errors
    ///
    /// Returns the registry failure.
    pub async fn sync_sm_topics(&self) -> Result<(), ClientError> {
        let topics = self.topics().await;

        self.registry.sync_topics(&topics).await.map_err(|e| {
            error!("Error while accessing Subscription Manager: {}", e);
            ClientError::from(e)
        })
    }
}
