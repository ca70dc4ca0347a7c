use swim_broker::TransportError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The broker refused the connection.
    #[error("connection refused by {0}")]
    ConnectionRefused(String),

    /// A failure queued up on the broker with one of its `fail_next_*` methods.
    #[error("{0}")]
    Injected(String),

    /// The link was already closed.
    #[error("link closed")]
    LinkClosed,

    /// No queue with this name has been declared.
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Senders may only target exchanges.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

impl TransportError for Error {}
