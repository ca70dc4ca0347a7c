use crate::error::BrokerHandlerError;

use std::future::Future;

use async_trait::async_trait;
use swim_broker::Connection;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Lifecycle shared by the publisher and subscriber handlers.
///
/// A handler owns one spawned loop. Starting twice fails, and once shut down a
/// handler stays down.
#[async_trait]
pub trait BrokerHandler
where
    Self: Clone + Send + Sync + 'static,
{
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Connects to the broker and spawns the handler loop.
    ///
    /// # Errors
    ///
    /// Returns `BrokerHandlerError::AlreadyStarted` on a second call and
    /// `BrokerHandlerError::Connection` if the broker cannot be reached.
    async fn start(&self) -> Result<(), BrokerHandlerError>;

    /// Stops the loop and closes every link it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop could not be stopped.
    async fn shutdown(&self) -> Result<(), BrokerHandlerError>;

    /// Waits for the loop to exit. Returns at once if it never started.
    async fn wait(&self);

    /// Whether the loop is running.
    fn is_running(&self) -> bool;
}

/// Shutdown token and task tracker of one handler loop.
#[derive(Clone, Debug, Default)]
pub(crate) struct Lifecycle {
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.task_tracker.spawn(task);
        self.task_tracker.close();
    }

    pub(crate) fn is_started(&self) -> bool {
        self.task_tracker.is_closed()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task_tracker.is_closed() && !self.task_tracker.is_empty()
    }

    /// Cancels the loop. Before the loop is started this does nothing, so a
    /// later start still runs.
    pub(crate) fn cancel(&self) {
        if self.is_started() {
            self.shutdown_token.cancel();
        }
    }

    pub(crate) async fn wait(&self) {
        if !self.is_started() {
            return;
        }

        self.task_tracker.wait().await;
    }
}

/// Closes a connection at the end of a loop, logging failures.
pub(crate) async fn close_connection<C>(connection: &C, name: &str)
where
    C: Connection,
{
    if let Err(e) = connection.close().await {
        warn!("{}: error while closing connection: {}", name, e);
    }
}
