use crate::message::{DEFAULT_CONTENT_TYPE, Message};
use crate::sender::Sender;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

/// Longest message preview written to the logs.
const LOG_PREVIEW_CHARS: usize = 100;

/// What happened to a message handed to a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport accepted the message.
    Sent,

    /// The sender had no credit; the message was dropped.
    NoCredit,

    /// The transport rejected the message.
    Failed,
}

/// Something that accepts messages addressed to a subject.
#[async_trait]
pub trait MessageSink
where
    Self: Send + Sync + 'static,
{
    /// Sends `message` with `subject` as routing key.
    ///
    /// `content_type` overrides whatever the message carries; when both are
    /// missing `application/json` is used.
    async fn send_message(
        &self,
        message: Message,
        subject: &str,
        content_type: Option<&str>,
    ) -> SendOutcome;
}

#[async_trait]
impl<T> MessageSink for Arc<T>
where
    T: MessageSink + ?Sized,
{
    async fn send_message(
        &self,
        message: Message,
        subject: &str,
        content_type: Option<&str>,
    ) -> SendOutcome {
        (**self).send_message(message, subject, content_type).await
    }
}

/// Wraps a transport sender and only sends while the broker grants credit.
///
/// Messages without credit are dropped, not buffered.
#[derive(Debug)]
pub struct CreditSender<S>
where
    S: Sender,
{
    sender: S,
}

impl<S> CreditSender<S>
where
    S: Sender,
{
    /// Wraps the given sender.
    pub const fn new(sender: S) -> Self {
        Self { sender }
    }

    /// Credit currently available on the underlying sender.
    pub fn credit(&self) -> u32 {
        self.sender.credit()
    }

    /// Closes the underlying sender.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the link could not be closed.
    pub async fn close(&self) -> Result<(), S::Error> {
        self.sender.close().await
    }
}

#[async_trait]
impl<S> MessageSink for CreditSender<S>
where
    S: Sender,
{
    async fn send_message(
        &self,
        mut message: Message,
        subject: &str,
        content_type: Option<&str>,
    ) -> SendOutcome {
        message.subject = Some(subject.to_string());
        match content_type {
            Some(content_type) => message.content_type = Some(content_type.to_string()),
            None if message.content_type.is_none() => {
                message.content_type = Some(DEFAULT_CONTENT_TYPE.to_string());
            }
            None => {}
        }

        let preview = message.preview(LOG_PREVIEW_CHARS);

        if self.sender.credit() == 0 {
            warn!("No credit to send message {}", preview);
            return SendOutcome::NoCredit;
        }

        match self.sender.send(message).await {
            Ok(()) => {
                debug!("Message sent: {}", preview);
                SendOutcome::Sent
            }
            Err(e) => {
                error!("Error while sending message {}: {}", preview, e);
                SendOutcome::Failed
            }
        }
    }
}
