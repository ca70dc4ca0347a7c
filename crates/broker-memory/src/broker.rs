use crate::error::Error;
use crate::routing::binding_matches;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use swim_broker::Message;
use tracing::{debug, trace};

/// Credit granted to new senders unless changed with `set_credit`.
const DEFAULT_CREDIT: u32 = 10;

#[derive(Debug)]
struct QueueState {
    active: bool,
    bindings: Vec<String>,
    receiver: flume::Receiver<Message>,
    sender: flume::Sender<Message>,
}

#[derive(Debug)]
struct BrokerState {
    accepting_connections: bool,
    credit: u32,
    fail_next_close: Option<String>,
    fail_next_receiver: Option<String>,
    fail_next_sender: Option<String>,
    published: Vec<Message>,
    queues: HashMap<String, QueueState>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            accepting_connections: true,
            credit: DEFAULT_CREDIT,
            fail_next_close: None,
            fail_next_receiver: None,
            fail_next_sender: None,
            published: Vec::new(),
            queues: HashMap::new(),
        }
    }
}

/// An in-process broker with a single topic exchange.
///
/// Cloning is cheap; clones share the same exchange and queues.
#[derive(Clone, Debug, Default)]
pub struct MemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue. Declaring an existing queue is a no-op.
    pub fn declare_queue(&self, queue: &str) {
        let mut state = self.state.write();
        state.queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = flume::unbounded();
            QueueState {
                active: true,
                bindings: Vec::new(),
                receiver,
                sender,
            }
        });
    }

    /// Binds a queue to the topic exchange, declaring it if needed.
    pub fn bind_queue(&self, queue: &str, binding_key: &str) {
        self.declare_queue(queue);

        let mut state = self.state.write();
        if let Some(queue_state) = state.queues.get_mut(queue) {
            if !queue_state.bindings.iter().any(|b| b == binding_key) {
                queue_state.bindings.push(binding_key.to_string());
            }
        }
        debug!("bound queue {} to {}", queue, binding_key);
    }

    /// Deletes a queue. Attached receivers see their stream end.
    pub fn delete_queue(&self, queue: &str) -> bool {
        self.state.write().queues.remove(queue).is_some()
    }

    /// Pauses or resumes routing into a queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueueNotFound` if the queue does not exist.
    pub fn set_queue_active(&self, queue: &str, active: bool) -> Result<(), Error> {
        let mut state = self.state.write();
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| Error::QueueNotFound(queue.to_string()))?;
        queue_state.active = active;
        Ok(())
    }

    /// Whether the queue exists.
    #[must_use]
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.read().queues.contains_key(queue)
    }

    /// Messages waiting in a queue.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .read()
            .queues
            .get(queue)
            .map_or(0, |q| q.receiver.len())
    }

    /// Sets the credit every sender reports.
    pub fn set_credit(&self, credit: u32) {
        self.state.write().credit = credit;
    }

    /// Refuses (or accepts again) new connections.
    pub fn set_accepting_connections(&self, accepting: bool) {
        self.state.write().accepting_connections = accepting;
    }

    /// Makes the next `create_sender` call fail with the given reason.
    pub fn fail_next_sender(&self, reason: impl Into<String>) {
        self.state.write().fail_next_sender = Some(reason.into());
    }

    /// Makes the next `create_receiver` call fail with the given reason.
    pub fn fail_next_receiver(&self, reason: impl Into<String>) {
        self.state.write().fail_next_receiver = Some(reason.into());
    }

    /// Makes the next receiver `close` call fail with the given reason.
    pub fn fail_next_close(&self, reason: impl Into<String>) {
        self.state.write().fail_next_close = Some(reason.into());
    }

    /// Every message accepted by the exchange so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Message> {
        self.state.read().published.clone()
    }

    pub(crate) fn credit(&self) -> u32 {
        self.state.read().credit
    }

    pub(crate) fn accepting_connections(&self) -> bool {
        self.state.read().accepting_connections
    }

    pub(crate) fn take_sender_failure(&self) -> Option<String> {
        self.state.write().fail_next_sender.take()
    }

    pub(crate) fn take_close_failure(&self) -> Option<String> {
        self.state.write().fail_next_close.take()
    }

    pub(crate) fn open_queue(&self, queue: &str) -> Result<flume::Receiver<Message>, Error> {
        let mut state = self.state.write();
        if let Some(reason) = state.fail_next_receiver.take() {
            return Err(Error::Injected(reason));
        }

        state
            .queues
            .get(queue)
            .map(|q| q.receiver.clone())
            .ok_or_else(|| Error::QueueNotFound(queue.to_string()))
    }

    /// Routes a message to every active queue whose binding matches its subject.
    pub(crate) fn route(&self, message: Message) -> usize {
        let mut state = self.state.write();
        let subject = message.subject().unwrap_or_default().to_string();

        let mut delivered = 0;
        for (name, queue) in &state.queues {
            if queue.active && queue.bindings.iter().any(|b| binding_matches(b, &subject)) {
                if queue.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
                trace!("routed {} to {}", subject, name);
            }
        }

        state.published.push(message);
        delivered
    }
}
