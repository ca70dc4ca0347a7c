mod consumer;
mod handler;

pub use consumer::{
    AsyncFnConsumer, FnConsumer, MessageConsumer, consumer_async_fn, consumer_fn,
};
pub use handler::SubscriberBrokerHandler;

use crate::error::{BrokerHandlerError, ClientError, RegistryServiceError};
use crate::registry::RegistryService;

use std::collections::BTreeMap;
use std::sync::Arc;

use swim_broker::Connector;
use swim_registry::RegistryClient;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Subscribes to topics through the registry and consumes their queues.
///
/// Subscriptions are tracked by topic name; each one owns the queue the registry
/// issued for it.
pub struct Subscriber<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    handler: SubscriberBrokerHandler<C>,
    id: Uuid,
    registry: RegistryService<R>,
    subscriptions: Arc<Mutex<BTreeMap<String, String>>>,
}

impl<C, R> std::fmt::Debug for Subscriber<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<C, R> Clone for Subscriber<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            id: self.id,
            registry: self.registry.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

fn log_registry_error(error: RegistryServiceError) -> ClientError {
    error!("Error while accessing Subscription Manager: {}", error);
    error.into()
}

impl<C, R> Subscriber<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    /// Creates a subscriber after checking its credentials with the registry.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidCredentials` on a 401 and
    /// `ClientError::Registry` on any other registry failure.
    pub async fn connect(
        handler: SubscriberBrokerHandler<C>,
        registry: RegistryService<R>,
    ) -> Result<Self, ClientError> {
        registry.authenticate().await?;

        Ok(Self {
            handler,
            id: Uuid::new_v4(),
            registry,
            subscriptions: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Identifies the subscriber within an app.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The handler owning this client's receivers.
    #[must_use]
    pub const fn handler(&self) -> &SubscriberBrokerHandler<C> {
        &self.handler
    }

    /// Names of every topic available in the registry.
    ///
    /// # Errors
    ///
    /// Returns the registry failure.
    pub async fn get_topics(&self) -> Result<Vec<String>, ClientError> {
        self.registry.get_topics().await.map_err(log_registry_error)
    }

    /// Topic names this client is subscribed to, with their queues.
    pub async fn subscriptions(&self) -> BTreeMap<String, String> {
        self.subscriptions.lock().await.clone()
    }

    /// Subscribes to `topic_name` and feeds its messages to `consumer`.
    ///
    /// Returns the queue issued by the registry. If the receiver cannot be
    /// created, the registry subscription is deleted again before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadySubscribed` for a topic this client already
    /// follows, `ClientError::Registry` if the registry refuses and
    /// `ClientError::BrokerHandler` if the receiver cannot be created.
    pub async fn subscribe(
        &self,
        topic_name: &str,
        consumer: impl MessageConsumer,
    ) -> Result<String, ClientError> {
        let mut subscriptions = self.subscriptions.lock().await;

        if subscriptions.contains_key(topic_name) {
            return Err(ClientError::AlreadySubscribed(topic_name.to_string()));
        }

        let queue = self
            .registry
            .subscribe(topic_name)
            .await
            .map_err(log_registry_error)?;

        debug!("Subscribed in SM and got unique queue {}", queue);

        if let Err(e) = self.handler.create_receiver(&queue, consumer).await {
            error!("{}", e);

            if let Err(cleanup) = self.registry.unsubscribe(&queue).await {
                error!(
                    "Error while deleting subscription of queue {} after a failed receiver: {}",
                    queue, cleanup
                );
            }

            return Err(e.into());
        }

        subscriptions.insert(topic_name.to_string(), queue.clone());
        info!("Subscribed to {} through queue {}", topic_name, queue);

        Ok(queue)
    }

    /// Stops consuming `topic_name` and deletes its subscription.
    ///
    /// A queue that no longer has a receiver on the handler does not block the
    /// registry deletion.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSubscribed` if this client does not follow the
    /// topic, otherwise the handler or registry failure.
    pub async fn unsubscribe(&self, topic_name: &str) -> Result<(), ClientError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let queue = subscriptions
            .get(topic_name)
            .cloned()
            .ok_or_else(|| ClientError::NotSubscribed(topic_name.to_string()))?;

        match self.handler.remove_receiver(&queue).await {
            Ok(()) => {}
            Err(BrokerHandlerError::NoReceiver(_)) => {
                warn!("No receiver left for queue {} of topic {}", queue, topic_name);
            }
            Err(e) => return Err(e.into()),
        }
        self.registry
            .unsubscribe(&queue)
            .await
            .map_err(log_registry_error)?;

        subscriptions.remove(topic_name);
        info!("Unsubscribed from {}", topic_name);

        Ok(())
    }

    /// Stops delivery for `topic_name`; messages published meanwhile are lost.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSubscribed` if this client does not follow the
    /// topic, otherwise the registry failure.
    pub async fn pause(&self, topic_name: &str) -> Result<(), ClientError> {
        let queue = self.queue_of(topic_name).await?;

        self.registry.pause(&queue).await.map_err(log_registry_error)
    }

    /// Resumes delivery for `topic_name`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSubscribed` if this client does not follow the
    /// topic, otherwise the registry failure.
    pub async fn resume(&self, topic_name: &str) -> Result<(), ClientError> {
        let queue = self.queue_of(topic_name).await?;

        self.registry.resume(&queue).await.map_err(log_registry_error)
    }

    async fn queue_of(&self, topic_name: &str) -> Result<String, ClientError> {
        self.subscriptions
            .lock()
            .await
            .get(topic_name)
            .cloned()
            .ok_or_else(|| ClientError::NotSubscribed(topic_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use swim_broker::{ConnectionSettings, Message};
    use swim_broker_memory::{MemoryBroker, MemoryConnector};
    use swim_registry_memory::{Call, MemoryRegistry, RegistryEvent};
    use tokio::sync::mpsc;

    use crate::handler::BrokerHandler;

    /// Declares queues on the broker as the registry issues them.
    fn wire(broker: &MemoryBroker, registry: &MemoryRegistry) {
        let broker = broker.clone();
        registry.observe(move |event| match event {
            RegistryEvent::SubscriptionCreated {
                topic,
                subscription,
            } => broker.bind_queue(&subscription.queue, &topic.name),
            RegistryEvent::SubscriptionDeleted { subscription } => {
                broker.delete_queue(&subscription.queue);
            }
            RegistryEvent::SubscriptionUpdated { subscription } => {
                let _ = broker.set_queue_active(&subscription.queue, subscription.active);
            }
        });
    }

    async fn subscriber(
        broker: &MemoryBroker,
        registry: &MemoryRegistry,
    ) -> Subscriber<MemoryConnector, MemoryRegistry> {
        let handler = SubscriberBrokerHandler::new(MemoryConnector::new(
            broker.clone(),
            ConnectionSettings::plain("localhost:5672"),
        ));
        handler.start().await.unwrap();

        Subscriber::connect(handler, RegistryService::new(registry.clone()))
            .await
            .unwrap()
    }

    fn channel() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_subscribe_creates_subscription_and_receiver() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;

        let queue = subscriber.subscribe("weather", channel().0).await.unwrap();

        assert_eq!(subscriber.handler().queues().await.unwrap(), vec![queue.clone()]);
        assert_eq!(subscriber.subscriptions().await.get("weather"), Some(&queue));
        assert_eq!(registry.subscriptions()[0].queue, queue);

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_topic() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;

        assert_matches!(
            subscriber.subscribe("traffic", channel().0).await,
            Err(ClientError::Registry(e)) if e.to_string().contains("traffic")
        );
        assert!(subscriber.handler().queues().await.unwrap().is_empty());
        assert!(subscriber.subscriptions().await.is_empty());

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_twice() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;

        subscriber.subscribe("weather", channel().0).await.unwrap();

        assert_matches!(
            subscriber.subscribe("weather", channel().0).await,
            Err(ClientError::AlreadySubscribed(_))
        );
        assert_eq!(registry.subscriptions().len(), 1);

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_failed_receiver_deletes_the_subscription() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;
        broker.fail_next_receiver("link detached");

        assert_matches!(
            subscriber.subscribe("weather", channel().0).await,
            Err(ClientError::BrokerHandler(BrokerHandlerError::ReceiverCreation { .. }))
        );

        assert!(registry.subscriptions().is_empty());
        assert!(subscriber.subscriptions().await.is_empty());
        assert!(logs_contain("Error while creating receiver for queue"));

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_resume_unsubscribe() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;
        let queue = subscriber.subscribe("weather", channel().0).await.unwrap();

        subscriber.pause("weather").await.unwrap();
        assert!(!registry.subscriptions()[0].active);
        subscriber.resume("weather").await.unwrap();
        assert!(registry.subscriptions()[0].active);

        subscriber.unsubscribe("weather").await.unwrap();
        assert!(registry.subscriptions().is_empty());
        assert!(!broker.has_queue(&queue));
        assert!(subscriber.handler().queues().await.unwrap().is_empty());

        registry.clear_calls();
        assert_matches!(
            subscriber.unsubscribe("weather").await,
            Err(ClientError::NotSubscribed(_))
        );
        assert_matches!(
            subscriber.pause("weather").await,
            Err(ClientError::NotSubscribed(_))
        );
        assert!(registry.calls().is_empty());

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_after_the_broker_dropped_the_queue() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;
        let queue = subscriber.subscribe("weather", channel().0).await.unwrap();

        broker.delete_queue(&queue);

        subscriber.unsubscribe("weather").await.unwrap();
        assert!(registry.subscriptions().is_empty());
        assert!(subscriber.subscriptions().await.is_empty());
        assert!(subscriber.handler().queues().await.unwrap().is_empty());

        let queue = subscriber.subscribe("weather", channel().0).await.unwrap();
        assert_eq!(registry.subscriptions()[0].queue, queue);

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn test_unsubscribe_without_receiver_still_deletes_the_subscription() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;
        let queue = subscriber.subscribe("weather", channel().0).await.unwrap();

        subscriber.handler().remove_receiver(&queue).await.unwrap();

        subscriber.unsubscribe("weather").await.unwrap();
        assert!(registry.subscriptions().is_empty());
        assert!(subscriber.subscriptions().await.is_empty());
        assert!(logs_contain("No receiver left for queue"));

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_close_keeps_the_subscription() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        wire(&broker, &registry);
        registry.seed_topic("weather");
        let subscriber = subscriber(&broker, &registry).await;
        subscriber.subscribe("weather", channel().0).await.unwrap();

        broker.fail_next_close("link busy");
        assert_matches!(
            subscriber.unsubscribe("weather").await,
            Err(ClientError::BrokerHandler(BrokerHandlerError::Close { .. }))
        );
        assert_eq!(registry.subscriptions().len(), 1);
        assert!(subscriber.subscriptions().await.contains_key("weather"));

        subscriber.unsubscribe("weather").await.unwrap();
        assert!(registry.subscriptions().is_empty());

        subscriber.handler().shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_topics() {
        let (broker, registry) = (MemoryBroker::new(), MemoryRegistry::new());
        registry.seed_topic("weather");
        registry.seed_topic("traffic");
        let subscriber = subscriber(&broker, &registry).await;

        assert_eq!(
            subscriber.get_topics().await.unwrap(),
            vec!["weather", "traffic"]
        );
        assert_eq!(
            registry.calls(),
            vec![Call::PingCredentials, Call::GetTopics]
        );

        subscriber.handler().shutdown().await.unwrap();
    }
}
