use crate::broker::MemoryBroker;
use crate::error::Error;
use crate::receiver::MemoryReceiver;
use crate::sender::MemorySender;

use async_trait::async_trait;
use swim_broker::{Connection, ConnectionSettings, Connector};
use tracing::info;

/// Connects to a `MemoryBroker`.
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    broker: MemoryBroker,
    settings: ConnectionSettings,
}

impl MemoryConnector {
    /// Creates a connector for the given broker.
    #[must_use]
    pub const fn new(broker: MemoryBroker, settings: ConnectionSettings) -> Self {
        Self { broker, settings }
    }

    /// The broker this connector talks to.
    #[must_use]
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Error = Error;
    type Connection = MemoryConnection;

    fn url(&self) -> String {
        self.settings.url()
    }

    async fn connect(&self) -> Result<MemoryConnection, Error> {
        if !self.broker.accepting_connections() {
            return Err(Error::ConnectionRefused(self.url()));
        }

        info!("Connected to broker @ {}", self.url());

        Ok(MemoryConnection {
            broker: self.broker.clone(),
        })
    }
}

/// An open connection to a `MemoryBroker`.
#[derive(Clone, Debug)]
pub struct MemoryConnection {
    broker: MemoryBroker,
}

#[async_trait]
impl Connection for MemoryConnection {
    type Error = Error;
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    async fn create_sender(&self, endpoint: &str) -> Result<MemorySender, Error> {
        if let Some(reason) = self.broker.take_sender_failure() {
            return Err(Error::Injected(reason));
        }

        if !endpoint.starts_with("/exchange/") {
            return Err(Error::UnknownEndpoint(endpoint.to_string()));
        }

        Ok(MemorySender::new(self.broker.clone()))
    }

    async fn create_receiver(&self, queue: &str) -> Result<MemoryReceiver, Error> {
        let receiver = self.broker.open_queue(queue)?;

        Ok(MemoryReceiver::new(self.broker.clone(), queue, receiver))
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
