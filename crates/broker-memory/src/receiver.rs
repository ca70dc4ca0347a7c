use crate::broker::MemoryBroker;
use crate::error::Error;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use swim_broker::{Message, Receiver};

/// Receiver attached to a single queue of a `MemoryBroker`.
pub struct MemoryReceiver {
    broker: MemoryBroker,
    queue: String,
    stream: Option<BoxStream<'static, Message>>,
}

impl MemoryReceiver {
    pub(crate) fn new(
        broker: MemoryBroker,
        queue: &str,
        receiver: flume::Receiver<Message>,
    ) -> Self {
        Self {
            broker,
            queue: queue.to_string(),
            stream: Some(receiver.into_stream().boxed()),
        }
    }
}

impl std::fmt::Debug for MemoryReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReceiver")
            .field("queue", &self.queue)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

impl Stream for MemoryReceiver {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        match self.stream.as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

#[async_trait]
impl Receiver for MemoryReceiver {
    type Error = Error;

    fn queue(&self) -> &str {
        &self.queue
    }

    async fn close(&mut self) -> Result<(), Error> {
        if let Some(reason) = self.broker.take_close_failure() {
            return Err(Error::Injected(reason));
        }

        self.stream.take().map(|_| ()).ok_or(Error::LinkClosed)
    }
}
