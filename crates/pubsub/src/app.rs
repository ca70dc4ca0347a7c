use crate::config::RegistryConfig;
use crate::error::{AppError, BoxError};
use crate::handler::BrokerHandler;
use crate::publisher::{Publisher, PublisherBrokerHandler};
use crate::registry::RegistryService;
use crate::subscriber::{MessageConsumer, Subscriber, SubscriberBrokerHandler};

use std::collections::BTreeMap;
use std::future::Future;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use swim_broker::Connector;
use swim_registry::RegistryClient;
use swim_registry_http::HttpRegistryClient;
use swim_topics::{Context, DispatchOutcome, TopicKind};
use tracing::{error, info};
use uuid::Uuid;

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Hosts a broker handler and runs it.
///
/// Hooks registered with `before_run` run in registration order right before the
/// handler starts; the first failing hook aborts the run.
pub struct App<H>
where
    H: BrokerHandler,
{
    handler: H,
    hooks: Mutex<Vec<Hook>>,
}

impl<H> App<H>
where
    H: BrokerHandler,
{
    /// Creates an app around `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// The hosted handler.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Registers a hook to run before the handler starts.
    pub fn before_run<F, Fut, E>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let hook: Hook = Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async move { hook().await.map_err(Into::into) })
        });
        self.hooks.lock().push(hook);
    }

    /// Runs the hooks and starts the handler, then returns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyRunning`, `AppError::BeforeRun` if a hook fails
    /// (the handler is not started) or the handler's start error.
    pub async fn run_threaded(&self) -> Result<(), AppError> {
        if self.handler.is_running() {
            return Err(AppError::AlreadyRunning);
        }

        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook().await.map_err(|e| {
                error!("Error while running before run hook: {}", e);
                AppError::BeforeRun(e)
            })?;
        }

        self.handler.start().await?;
        info!("{} is running", self.handler.name());

        Ok(())
    }

    /// Like `run_threaded`, but only returns once the handler has stopped.
    ///
    /// # Errors
    ///
    /// Same as `run_threaded`.
    pub async fn run(&self) -> Result<(), AppError> {
        self.run_threaded().await?;
        self.handler.wait().await;

        Ok(())
    }

    /// Whether the handler is running.
    pub fn is_running(&self) -> bool {
        self.handler.is_running()
    }

    /// Stops the handler.
    ///
    /// # Errors
    ///
    /// Returns the handler's shutdown error.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        Ok(self.handler.shutdown().await?)
    }
}

/// An app publishing topics, either directly or through registered publishers.
pub struct PubApp<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    app: App<PublisherBrokerHandler<C>>,
    publishers: Mutex<BTreeMap<Uuid, Publisher<C, R>>>,
    topics: Mutex<BTreeMap<String, TopicKind>>,
}

impl<C, R> PubApp<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    /// Creates an app publishing through `handler`.
    pub fn new(handler: PublisherBrokerHandler<C>) -> Self {
        Self {
            app: App::new(handler),
            publishers: Mutex::new(BTreeMap::new()),
            topics: Mutex::new(BTreeMap::new()),
        }
    }

    /// The hosted app, used to run and stop it.
    pub const fn app(&self) -> &App<PublisherBrokerHandler<C>> {
        &self.app
    }

    /// The app's handler.
    pub const fn handler(&self) -> &PublisherBrokerHandler<C> {
        self.app.handler()
    }

    /// Adds a topic straight to the handler, without involving the registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateTopic` if the app already has a topic with
    /// this id.
    pub fn register_topic(&self, topic: impl Into<TopicKind>) -> Result<(), AppError> {
        let topic = topic.into();
        let mut topics = self.topics.lock();

        if topics.contains_key(topic.id()) {
            error!("Topic with name {} already exists in broker.", topic.id());
            return Err(AppError::DuplicateTopic(topic.id().to_string()));
        }

        self.app.handler().add_topic(topic.clone())?;
        topics.insert(topic.id().to_string(), topic);

        Ok(())
    }

    /// Publishes a topic registered with `register_topic` on demand.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownTopic` if the app has no topic with this id.
    pub async fn publish_topic(
        &self,
        topic_id: &str,
        context: Context,
    ) -> Result<DispatchOutcome, AppError> {
        let topic = self
            .topics
            .lock()
            .get(topic_id)
            .map(|topic| topic.topic().clone())
            .ok_or_else(|| AppError::UnknownTopic(topic_id.to_string()))?;

        Ok(self.app.handler().trigger_topic(&topic, context).await?)
    }

    /// Creates a publisher sharing the app's handler and keeps track of it.
    ///
    /// # Errors
    ///
    /// Returns the client error, e.g. `ClientError::InvalidCredentials`.
    pub async fn register_publisher(&self, registry: R) -> Result<Publisher<C, R>, AppError> {
        let publisher =
            Publisher::connect(self.app.handler().clone(), RegistryService::new(registry))
                .await?;
        self.publishers
            .lock()
            .insert(publisher.id(), publisher.clone());

        Ok(publisher)
    }

    /// Ids of the publishers created through the app.
    pub fn clients(&self) -> Vec<Uuid> {
        self.publishers.lock().keys().copied().collect()
    }

    /// Forgets a publisher created through the app.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientNotFound` if no publisher has this id.
    pub fn remove_client(&self, id: Uuid) -> Result<Publisher<C, R>, AppError> {
        self.publishers
            .lock()
            .remove(&id)
            .ok_or(AppError::ClientNotFound(id))
    }
}

impl<C> PubApp<C, HttpRegistryClient>
where
    C: Connector,
{
    /// Creates a publisher talking to the Subscription Manager described by
    /// `config` with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RegistryClient` if the client cannot be built, otherwise
    /// the client error, e.g. `ClientError::InvalidCredentials`.
    pub async fn register_publisher_with_credentials(
        &self,
        config: &RegistryConfig,
        username: &str,
        password: &str,
    ) -> Result<Publisher<C, HttpRegistryClient>, AppError> {
        self.register_publisher(config.client(username, password)?)
            .await
    }
}

/// An app consuming queues, either directly or through registered subscribers.
pub struct SubApp<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    app: App<SubscriberBrokerHandler<C>>,
    subscribers: Mutex<BTreeMap<Uuid, Subscriber<C, R>>>,
}

impl<C, R> SubApp<C, R>
where
    C: Connector,
    R: RegistryClient,
{
    /// Creates an app consuming through `handler`.
    pub fn new(handler: SubscriberBrokerHandler<C>) -> Self {
        Self {
            app: App::new(handler),
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    /// The hosted app, used to run and stop it.
    pub const fn app(&self) -> &App<SubscriberBrokerHandler<C>> {
        &self.app
    }

    /// The app's handler.
    pub const fn handler(&self) -> &SubscriberBrokerHandler<C> {
        self.app.handler()
    }

    /// Consumes an existing queue directly, without involving the registry.
    ///
    /// # Errors
    ///
    /// Returns the handler error.
    pub async fn attach_queue(
        &self,
        queue: &str,
        consumer: impl MessageConsumer,
    ) -> Result<(), AppError> {
        Ok(self.app.handler().create_receiver(queue, consumer).await?)
    }

    /// Stops consuming a queue attached with `attach_queue`.
    ///
    /// # Errors
    ///
    /// Returns the handler error, `BrokerHandlerError::NoReceiver` if the queue
    /// is not attached.
    pub async fn detach_queue(&self, queue: &str) -> Result<(), AppError> {
        Ok(self.app.handler().remove_receiver(queue).await?)
    }

    /// Creates a subscriber sharing the app's handler and keeps track of it.
    ///
    /// # Errors
    ///
    /// Returns the client error, e.g. `ClientError::InvalidCredentials`.
    pub async fn register_subscriber(&self, registry: R) -> Result<Subscriber<C, R>, AppError> {
        let subscriber =
            Subscriber::connect(self.app.handler().clone(), RegistryService::new(registry))
                .await?;
        self.subscribers
            .lock()
            .insert(subscriber.id(), subscriber.clone());

        Ok(subscriber)
    }

    /// Ids of the subscribers created through the app.
    pub fn clients(&self) -> Vec<Uuid> {
        self.subscribers.lock().keys().copied().collect()
    }

    /// Forgets a subscriber created through the app.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientNotFound` if no subscriber has this id.
    pub fn remove_client(&self, id: Uuid) -> Result<Subscriber<C, R>, AppError> {
        self.subscribers
            .lock()
            .remove(&id)
            .ok_or(AppError::ClientNotFound(id))
    }
}

impl<C> SubApp<C, HttpRegistryClient>
where
    C: Connector,
{
    /// Creates a subscriber talking to the Subscription Manager described by
    /// `config` with the given credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::RegistryClient` if the client cannot be built, otherwise
    /// the client error, e.g. `ClientError::InvalidCredentials`.
    pub async fn register_subscriber_with_credentials(
        &self,
        config: &RegistryConfig,
        username: &str,
        password: &str,
    ) -> Result<Subscriber<C, HttpRegistryClient>, AppError> {
        self.register_subscriber(config.client(username, password)?)
            .await
    }
}
