use crate::error::DataConsumerError;

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use swim_broker::Message;

/// Processes the messages arriving on a queue.
///
/// Errors are logged by the subscriber and do not stop the queue.
#[async_trait]
pub trait MessageConsumer
where
    Self: Send + Sync + 'static,
{
    /// Processes one message received on `queue`.
    async fn consume(&self, queue: &str, message: Message) -> Result<(), DataConsumerError>;
}

/// Consumer backed by a synchronous function.
pub struct FnConsumer<F>(F);

/// Wraps a function taking the message into a consumer.
pub const fn consumer_fn<F>(f: F) -> FnConsumer<F>
where
    F: Fn(Message) -> Result<(), DataConsumerError> + Send + Sync + 'static,
{
    FnConsumer(f)
}

#[async_trait]
impl<F> MessageConsumer for FnConsumer<F>
where
    F: Fn(Message) -> Result<(), DataConsumerError> + Send + Sync + 'static,
{
    async fn consume(&self, _queue: &str, message: Message) -> Result<(), DataConsumerError> {
        (self.0)(message)
    }
}

/// Consumer backed by an async function.
pub struct AsyncFnConsumer<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wraps an async function taking the message into a consumer.
pub const fn consumer_async_fn<F, Fut>(f: F) -> AsyncFnConsumer<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DataConsumerError>> + Send + 'static,
{
    AsyncFnConsumer {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> MessageConsumer for AsyncFnConsumer<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DataConsumerError>> + Send + 'static,
{
    async fn consume(&self, _queue: &str, message: Message) -> Result<(), DataConsumerError> {
        (self.f)(message).await
    }
}

#[async_trait]
impl MessageConsumer for tokio::sync::mpsc::UnboundedSender<Message> {
    async fn consume(&self, _queue: &str, message: Message) -> Result<(), DataConsumerError> {
        self.send(message)
            .map_err(|_| DataConsumerError::new("consumer channel closed"))
    }
}
