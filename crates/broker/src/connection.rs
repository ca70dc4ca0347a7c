use crate::receiver::Receiver;
use crate::sender::Sender;

use std::error::Error;

use async_trait::async_trait;

/// Marker trait for transport errors.
pub trait TransportError: Error + Send + Sync + 'static {}

/// Opens connections to a broker.
#[async_trait]
pub trait Connector
where
    Self: Send + Sync + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// The connection type produced by this connector.
    type Connection: Connection<Error = Self::Error>;

    /// The URL of the broker, e.g. `amqps://broker:5671`.
    fn url(&self) -> String;

    /// Connects to the broker.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;
}

/// An open connection to a broker.
#[async_trait]
pub trait Connection
where
    Self: Send + Sync + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// Senders opened on this connection.
    type Sender: Sender<Error = Self::Error>;

    /// Receivers opened on this connection.
    type Receiver: Receiver<Error = Self::Error>;

    /// Opens a sender on the given endpoint (usually an exchange).
    async fn create_sender(&self, endpoint: &str) -> Result<Self::Sender, Self::Error>;

    /// Opens a receiver on the given queue.
    async fn create_receiver(&self, queue: &str) -> Result<Self::Receiver, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;
}
