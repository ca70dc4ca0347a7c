use crate::error::BrokerHandlerError;
use crate::handler::{BrokerHandler, Lifecycle, close_connection};
use crate::subscriber::consumer::MessageConsumer;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use swim_broker::{Connection, Connector, Message, Receiver};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NAME: &str = "subscriber-broker-handler";

type ReceiverOf<C> = <<C as Connector>::Connection as Connection>::Receiver;

type Reply<T> = oneshot::Sender<Result<T, BrokerHandlerError>>;

enum Command {
    CreateReceiver {
        consumer: Arc<dyn MessageConsumer>,
        queue: String,
        reply: Reply<()>,
    },
    Queues(oneshot::Sender<Vec<String>>),
    RemoveReceiver {
        queue: String,
        reply: Reply<()>,
    },
}

enum Event {
    Command(Command),
    Delivery(String, Delivery),
    Shutdown,
}

enum Delivery {
    Detached,
    Message(Message),
}

/// A receiver that outlives its stream.
///
/// When the broker ends the stream the link reports `Delivery::Detached` once and
/// then stays pending, so it keeps its slot in the `StreamMap` until removed.
struct Link<R> {
    detached: bool,
    receiver: R,
}

impl<R> Link<R> {
    const fn new(receiver: R) -> Self {
        Self {
            detached: false,
            receiver,
        }
    }
}

impl<R> Stream for Link<R>
where
    R: Receiver,
{
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Delivery>> {
        if self.detached {
            return Poll::Pending;
        }

        match Pin::new(&mut self.receiver).poll_next(cx) {
            Poll::Ready(Some(message)) => Poll::Ready(Some(Delivery::Message(message))),
            Poll::Ready(None) => {
                self.detached = true;
                Poll::Ready(Some(Delivery::Detached))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Attaches receivers to queues and feeds their messages to consumers.
///
/// Receivers and consumers are owned by a spawned loop keyed by queue name.
pub struct SubscriberBrokerHandler<C>
where
    C: Connector,
{
    commands: mpsc::UnboundedSender<Command>,
    connector: Arc<C>,
    inbox: Arc<Mutex<Option<mpsc::UnboundedReceiver<Command>>>>,
    lifecycle: Lifecycle,
}

impl<C> Clone for SubscriberBrokerHandler<C>
where
    C: Connector,
{
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            connector: self.connector.clone(),
            inbox: self.inbox.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<C> SubscriberBrokerHandler<C>
where
    C: Connector,
{
    /// Creates a handler for the broker behind `connector`.
    pub fn new(connector: C) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();

        Self {
            commands,
            connector: Arc::new(connector),
            inbox: Arc::new(Mutex::new(Some(inbox))),
            lifecycle: Lifecycle::new(),
        }
    }

    /// The connector used to reach the broker.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Opens a receiver on `queue` and routes its messages to `consumer`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` before `start`,
    /// `BrokerHandlerError::DuplicateReceiver` if the queue already has a
    /// receiver and `BrokerHandlerError::ReceiverCreation` if the broker refuses.
    pub async fn create_receiver(
        &self,
        queue: &str,
        consumer: impl MessageConsumer,
    ) -> Result<(), BrokerHandlerError> {
        let consumer: Arc<dyn MessageConsumer> = Arc::new(consumer);
        self.request(|reply| Command::CreateReceiver {
            consumer,
            queue: queue.to_string(),
            reply,
        })
        .await?
    }

    /// Closes the receiver on `queue` and forgets its consumer.
    ///
    /// A receiver whose stream was already ended by the broker is forgotten
    /// without closing it again. If closing fails the receiver stays attached.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NoReceiver` if nothing is attached to the queue
    /// and `BrokerHandlerError::Close` if the broker refuses to close it.
    pub async fn remove_receiver(&self, queue: &str) -> Result<(), BrokerHandlerError> {
        self.request(|reply| Command::RemoveReceiver {
            queue: queue.to_string(),
            reply,
        })
        .await?
    }

    /// Queues that currently have a receiver, detached ones included, sorted.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::NotRunning` if the loop is not running.
    pub async fn queues(&self) -> Result<Vec<String>, BrokerHandlerError> {
        self.request(Command::Queues).await
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
impl<C> BrokerHandler for SubscriberBrokerHandler<C>
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

        let commands = inbox.take().ok_or(BrokerHandlerError::AlreadyStarted)?;
        let subscriber_loop = SubscriberLoop::<C> {
            commands,
            connection,
            consumers: HashMap::new(),
            receivers: StreamMap::new(),
            shutdown_token: self.lifecycle.shutdown_token(),
        };
        self.lifecycle.spawn(subscriber_loop.run());

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

struct SubscriberLoop<C>
where
    C: Connector,
{
    commands: mpsc::UnboundedReceiver<Command>,
    connection: C::Connection,
    consumers: HashMap<String, Arc<dyn MessageConsumer>>,
    receivers: StreamMap<String, Link<ReceiverOf<C>>>,
    shutdown_token: CancellationToken,
}

impl<C> SubscriberLoop<C>
where
    C: Connector,
{
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => Event::Shutdown,
                command = self.commands.recv() => command.map_or(Event::Shutdown, Event::Command),
                Some((queue, delivery)) = self.receivers.next(), if !self.receivers.is_empty() => {
                    Event::Delivery(queue, delivery)
                }
            };

            match event {
                Event::Command(command) => self.handle(command).await,
                Event::Delivery(queue, Delivery::Message(message)) => {
                    self.on_message(&queue, message).await;
                }
                Event::Delivery(queue, Delivery::Detached) => {
                    warn!("Receiver of queue {} was detached by the broker", queue);
                }
                Event::Shutdown => break,
            }
        }

        self.close().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CreateReceiver {
                consumer,
                queue,
                reply,
            } => {
                let _ = reply.send(self.create_receiver(queue, consumer).await);
            }
            Command::Queues(reply) => {
                let mut queues: Vec<String> = self.receivers.keys().cloned().collect();
                queues.sort();
                let _ = reply.send(queues);
            }
            Command::RemoveReceiver { queue, reply } => {
                let _ = reply.send(self.remove_receiver(&queue).await);
            }
        }
    }

    async fn create_receiver(
        &mut self,
        queue: String,
        consumer: Arc<dyn MessageConsumer>,
    ) -> Result<(), BrokerHandlerError> {
        if self.receivers.contains_key(&queue) {
            return Err(BrokerHandlerError::DuplicateReceiver(queue));
        }

        let receiver = self
            .connection
            .create_receiver(&queue)
            .await
            .map_err(|e| BrokerHandlerError::ReceiverCreation {
                queue: queue.clone(),
                reason: e.to_string(),
            })?;

        debug!("Created receiver for queue {}", queue);

        self.consumers.insert(queue.clone(), consumer);
        self.receivers.insert(queue, Link::new(receiver));

        Ok(())
    }

    async fn remove_receiver(&mut self, queue: &str) -> Result<(), BrokerHandlerError> {
        let (_, link) = self
            .receivers
            .iter_mut()
            .find(|(key, _)| key.as_str() == queue)
            .ok_or_else(|| BrokerHandlerError::NoReceiver(queue.to_string()))?;

        if link.detached {
            debug!("Receiver of queue {} is already detached", queue);
        } else {
            link.receiver
                .close()
                .await
                .map_err(|e| BrokerHandlerError::Close {
                    link: format!("receiver of queue {queue}"),
                    reason: e.to_string(),
                })?;
        }

        self.receivers.remove(queue);
        self.consumers.remove(queue);

        debug!("Removed receiver of queue {}", queue);

        Ok(())
    }

    async fn on_message(&mut self, queue: &str, message: Message) {
        let Some(consumer) = self.consumers.get(queue).cloned() else {
            warn!("Dropping message from queue {} with no consumer", queue);
            return;
        };

        if let Err(e) = consumer.consume(queue, message.clone()).await {
            error!(
                "Error while processing message {} from queue {}: {}",
                message, queue, e
            );
        }
    }

    async fn close(mut self) {
        let queues: Vec<String> = self.receivers.keys().cloned().collect();
        for queue in queues {
            if let Some(mut link) = self.receivers.remove(&queue) {
                if link.detached {
                    continue;
                }
                if let Err(e) = link.receiver.close().await {
                    warn!("{}: error while closing receiver of {}: {}", NAME, queue, e);
                }
            }
        }

        close_connection(&self.connection, NAME).await;

        info!("{} stopped", NAME);
    }
}
