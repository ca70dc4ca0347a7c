use crate::connection::TransportError;
use crate::message::Message;

use async_trait::async_trait;
use futures::Stream;

/// Inbound link attached to a single queue.
///
/// Messages are pulled through the `Stream` implementation; the stream ends when
/// the queue is deleted or the connection goes away.
#[async_trait]
pub trait Receiver
where
    Self: Stream<Item = Message> + Send + Unpin + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// The queue this receiver is attached to.
    fn queue(&self) -> &str;

    /// Detaches from the queue.
    async fn close(&mut self) -> Result<(), Self::Error>;
}
