use crate::error::BrokerHandlerError;
use crate::handler::{BrokerHandler, Lifecycle, close_connection};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use swim_broker::{
    Connection, Connector, CreditSender, Message, MessageSink, SendOutcome,
    TOPIC_EXCHANGE_ENDPOINT,
};
use swim_topics::{Context, DispatchOutcome, Scheduler, Topic, TopicKind};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NAME: &str = "publisher-broker-handler";

type SenderOf<C> = <<C as Connector>::Connection as Connection>::Sender;
type SinkOf<C> = Arc<CreditSender<SenderOf<C>>>;

type Reply<T> = oneshot::Sender<Result<T, BrokerHandlerError>>;

enum Command {
    AddTopic(TopicKind),
    ScheduledTopics(oneshot::Sender<Vec<String>>),
    Send {
        content_type: Option<String>,
        message: Message,
        reply: Reply<SendOutcome>,
        subject: String,
    },
    Trigger {
        context: Context,
        reply: Reply<DispatchOutcome>,
        topic: Topic,
    },
}

enum Event {
    Command(Command),
    Due(usize),
    Shutdown,
}

/// Publishes topics to the broker's topic exchange.
///
/// The handler owns one sender and the scheduler of its scheduled topics. Both
/// live inside a spawned loop; this type only sends commands to it, so clones
/// can be handed around freely.
pub struct PublisherBrokerHandler<C>
where
    C: Connector,
{
    commands: mpsc::UnboundedSender<Command>,
    connector: Arc<C>,
    endpoint: String,
    inbox: Arc<Mutex<Option<mpsc::UnboundedReceiver<Command>>>>,
    lifecycle: Lifecycle,
}

impl<C> Clone for PublisherBrokerHandler<C>
where
    C: Connector,
{
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            connector: self.connector.clone(),
            endpoint: self.endpoint.clone(),
            inbox: self.inbox.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<C> PublisherBrokerHandler<C>
where
    C: Connector,
{
    /// Creates a handler sending to the topic exchange.
    pub fn new(connector: C) -> Self {
        Self::with_endpoint(connector, TOPIC_EXCHANGE_ENDPOINT)
    }

    /// Creates a handler sending to another endpoint.
    pub fn with_endpoint(connector: C, endpoint: impl Into<String>) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();

        Self {
            commands,
            connector: Arc::new(connector),
            endpoint: endpoint.into(),
            inbox: Arc::new(Mutex::new(Some(inbox))),
            lifecycle: Lifecycle::new(),
        }
    }

    /// The connector used to reach the broker.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Hands a topic to the handler.
    ///
    /// Topics added before `start` are picked up when the loop starts. Scheduled
    /// topics get their first dispatch one interval after they are added.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` if the loop has already exited.
    pub fn add_topic(&self, topic: impl Into<TopicKind>) -> Result<(), BrokerHandlerError> {
        self.commands
            .send(Command::AddTopic(topic.into()))
            .map_err(|_| BrokerHandlerError::NotRunning)
    }

    /// Whether `add_topic` can still hand topics to the loop, i.e. the loop has
    /// not exited yet.
    #[must_use]
    pub fn accepts_topics(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Runs the topic's pipeline on `context` and sends the result right away.
    ///
    /// Pipeline failures are logged and reported as
    /// `DispatchOutcome::PipelineFailed`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` if the loop is not running and
    /// `BrokerHandlerError::NoSender` if the sender could not be created.
    pub async fn trigger_topic(
        &self,
        topic: &Topic,
        context: Context,
    ) -> Result<DispatchOutcome, BrokerHandlerError> {
        let topic = topic.clone();
        self.request(|reply| Command::Trigger {
            context,
            reply,
            topic,
        })
        .await?
    }

    /// Sends a message with `subject` as routing key.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` if the loop is not running and
    /// `BrokerHandlerError::NoSender` if the sender could not be created.
    pub async fn send_message(
        &self,
        message: impl Into<Message>,
        subject: &str,
        content_type: Option<&str>,
    ) -> Result<SendOutcome, BrokerHandlerError> {
        let message = message.into();
        self.request(|reply| Command::Send {
            content_type: content_type.map(ToString::to_string),
            message,
            reply,
            subject: subject.to_string(),
        })
        .await?
    }

    /// Ids of the topics currently on a timer.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` if the loop is not running.
    pub async fn scheduled_topics(&self) -> Result<Vec<String>, BrokerHandlerError> {
        self.request(Command::ScheduledTopics).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BrokerHandlerError> {
        if !self.lifecycle.is_running() {
            return Err(BrokerHandlerError::NotRunning);
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| BrokerHandlerError::NotRunning)?;

        response.await.map_err(|_| BrokerHandlerError::NotRunning)
    }
}

#[async_trait]
impl<C> BrokerHandler for PublisherBrokerHandler<C>
where
    C: Connector,
{
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<(), BrokerHandlerError> {
        let mut inbox = self.inbox.lock().await;
        if inbox.is_none() || self.lifecycle.is_started() {
            return Err(BrokerHandlerError::AlreadyStarted);
        }

        info!("Starting {}...", NAME);

        let url = self.connector.url();
        let connection = self
            .connector
            .connect()
            .await
            .map_err(|e| BrokerHandlerError::Connection {
                url,
                reason: e.to_string(),
            })?;

        let sender = match connection.create_sender(&self.endpoint).await {
            Ok(sender) => Some(Arc::new(CreditSender::new(sender))),
            Err(e) => {
                error!("Error while creating sender: {}", e);
                None
            }
        };

        let commands = inbox.take().ok_or(BrokerHandlerError::AlreadyStarted)?;
        let publisher_loop = PublisherLoop::<C> {
            commands,
            connection,
            scheduler: Scheduler::new(),
            sender,
            shutdown_token: self.lifecycle.shutdown_token(),
            topics: HashSet::new(),
        };
        self.lifecycle.spawn(publisher_loop.run());

        info!("{} started", NAME);

        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BrokerHandlerError> {
        info!("{} shutting down...", NAME);

        self.lifecycle.cancel();
        self.lifecycle.wait().await;

        info!("{} shutdown", NAME);

        Ok(())
    }

    async fn wait(&self) {
        self.lifecycle.wait().await;
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }
}

struct PublisherLoop<C>
where
    C: Connector,
{
    commands: mpsc::UnboundedReceiver<Command>,
    connection: C::Connection,
    scheduler: Scheduler<SinkOf<C>>,
    sender: Option<SinkOf<C>>,
    shutdown_token: CancellationToken,
    topics: HashSet<String>,
}

impl<C> PublisherLoop<C>
where
    C: Connector,
{
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => Event::Shutdown,
                command = self.commands.recv() => command.map_or(Event::Shutdown, Event::Command),
                key = self.scheduler.next_due() => Event::Due(key),
            };

            match event {
                Event::Command(command) => self.handle(command).await,
                Event::Due(key) => {
                    self.scheduler.dispatch(key).await;
                }
                Event::Shutdown => break,
            }
        }

        self.close().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::AddTopic(topic) => self.add_topic(topic),
            Command::ScheduledTopics(reply) => {
                let _ = reply.send(self.scheduler.topic_ids().map(String::from).collect());
            }
            Command::Send {
                content_type,
                message,
                reply,
                subject,
            } => {
                let outcome = match &self.sender {
                    Some(sender) => Ok(sender
                        .send_message(message, &subject, content_type.as_deref())
                        .await),
                    None => Err(BrokerHandlerError::NoSender),
                };
                let _ = reply.send(outcome);
            }
            Command::Trigger {
                context,
                reply,
                topic,
            } => {
                let outcome = Self::trigger(self.sender.as_ref(), &topic, context).await;
                let _ = reply.send(outcome);
            }
        }
    }

    fn add_topic(&mut self, topic: TopicKind) {
        if !self.topics.insert(topic.id().to_string()) {
            warn!("Topic {} is already handled by {}", topic.id(), NAME);
            return;
        }

        let TopicKind::Scheduled(scheduled) = topic else {
            debug!("added on demand topic {}", topic.id());
            return;
        };

        match &self.sender {
            Some(sender) => self.scheduler.schedule(scheduled.bind(sender.clone())),
            None => warn!(
                "Not able to send messages because no sender has been assigned yet for topic '{}'",
                scheduled.id()
            ),
        }
    }

    async fn trigger(
        sender: Option<&SinkOf<C>>,
        topic: &Topic,
        context: Context,
    ) -> Result<DispatchOutcome, BrokerHandlerError> {
        let Some(sender) = sender else {
            warn!(
                "Not able to send messages because no sender has been assigned yet for topic '{}'",
                topic.id()
            );
            return Err(BrokerHandlerError::NoSender);
        };

        match topic.dispatch(sender, context).await {
            Ok(outcome) => Ok(outcome.into()),
            Err(e) => {
                error!("Error while getting data of topic {}: {}", topic.id(), e);
                Ok(DispatchOutcome::PipelineFailed)
            }
        }
    }

    async fn close(self) {
        if let Some(sender) = self.sender {
            if let Err(e) = sender.close().await {
                warn!("{}: error while closing sender: {}", NAME, e);
            }
        }

        close_connection(&self.connection, NAME).await;

        info!("{} stopped", NAME);
    }
}
