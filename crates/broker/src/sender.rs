use crate::connection::TransportError;
use crate::message::Message;

use async_trait::async_trait;

/// Outbound link to an exchange.
#[async_trait]
pub trait Sender
where
    Self: Send + Sync + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// Flow-control tokens currently granted by the broker.
    fn credit(&self) -> u32;

    /// Sends a message. Callers are expected to check `credit` first.
    async fn send(&self, message: Message) -> Result<(), Self::Error>;

    /// Closes the link.
    async fn close(&self) -> Result<(), Self::Error>;
}
