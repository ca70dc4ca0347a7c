use std::path::PathBuf;

use http::StatusCode;
use swim_registry::ApiError;
use thiserror::Error;

/// Boxed error returned by user hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the broker handlers.
#[derive(Debug, Error)]
pub enum BrokerHandlerError {
    /// The handler has already been started.
    #[error("broker handler already started")]
    AlreadyStarted,

    /// A transport link could not be closed.
    #[error("failed to close {link}: {reason}")]
    Close {
        /// Which link failed to close.
        link: String,
        /// The transport error.
        reason: String,
    },

    /// The broker refused or dropped the connection.
    #[error("failed to connect to broker @ {url}: {reason}")]
    Connection {
        /// The broker URL.
        url: String,
        /// The transport error.
        reason: String,
    },

    /// A receiver is already attached to the queue.
    #[error("a receiver already exists for queue: {0}")]
    DuplicateReceiver(String),

    /// No receiver is attached to the queue.
    #[error("No receiver found for queue: {0}")]
    NoReceiver(String),

    /// The publisher has no sender, so nothing can be sent.
    #[error("no sender has been assigned to the publisher")]
    NoSender,

    /// The handler loop is not running.
    #[error("broker handler is not running")]
    NotRunning,

    /// The transport refused to open a receiver.
    #[error("Error while creating receiver for queue {queue}: {reason}")]
    ReceiverCreation {
        /// The queue.
        queue: String,
        /// The transport error.
        reason: String,
    },
}

/// Errors raised by the registry service facade.
///
/// The message is what gets shown to users; the registry status code is kept so
/// callers can tell a conflict from any other failure.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct RegistryServiceError {
    message: String,
    status: Option<StatusCode>,
}

impl RegistryServiceError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn from_api(context: impl std::fmt::Display, error: &ApiError) -> Self {
        Self {
            message: format!("{context}: {error}"),
            status: error.status(),
        }
    }

    /// The user facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The registry status code, if the registry answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Whether the registry answered 409.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == Some(StatusCode::CONFLICT)
    }

    /// Whether the registry answered 401.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Errors raised by publisher and subscriber clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The subscriber already holds a subscription for the topic.
    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    /// Broker handler error.
    #[error(transparent)]
    BrokerHandler(#[from] BrokerHandlerError),

    /// The publisher already holds a topic with this id.
    #[error("topic with id {0} already exists")]
    DuplicateTopic(String),

    /// The registry rejected the client's credentials.
    #[error("Invalid user credentials")]
    InvalidCredentials,

    /// The subscriber holds no subscription for the topic.
    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    /// Registry service error.
    #[error(transparent)]
    Registry(#[from] RegistryServiceError),

    /// The publisher holds no topic with this id.
    #[error("{0} is not a registered topic")]
    UnknownTopic(String),
}

/// Errors raised by apps.
#[derive(Debug, Error)]
pub enum AppError {
    /// The app is already running.
    #[error("app is already running")]
    AlreadyRunning,

    /// A `before_run` hook failed; the handler was not started.
    #[error("before run hook failed: {0}")]
    BeforeRun(BoxError),

    /// Broker handler error.
    #[error(transparent)]
    BrokerHandler(#[from] BrokerHandlerError),

    /// Client error.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// No client with this id was created through the app.
    #[error("client {0} not found")]
    ClientNotFound(uuid::Uuid),

    /// A topic with this id is already registered with the app.
    #[error("Topic with name {0} already exists in broker.")]
    DuplicateTopic(String),

    /// The registry client could not be built from the configuration.
    #[error(transparent)]
    RegistryClient(#[from] swim_registry_http::Error),

    /// The app holds no topic with this id.
    #[error("Invalid topic_name: {0}")]
    UnknownTopic(String),
}

/// Error a message consumer returns when it could not process a message.
///
/// The subscriber logs it and moves on to the next message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DataConsumerError(String);

impl DataConsumerError {
    /// Creates a consumer error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file does not end in `.yml` or `.yaml`.
    #[error("{0} is not a YAML file")]
    Extension(PathBuf),

    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// The IO error.
        source: std::io::Error,
    },

    /// The YAML could not be parsed into a configuration.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
