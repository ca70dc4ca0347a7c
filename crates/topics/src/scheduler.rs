use crate::topic::{BoundTopic, DispatchOutcome};

use std::future::pending;

use futures::StreamExt;
use swim_broker::MessageSink;
use tokio_util::time::DelayQueue;
use tracing::debug;

/// Owns the timers of every bound topic of one handler.
///
/// Topics are never removed: each one is re-armed after every dispatch, whatever
/// the outcome, for as long as the scheduler lives.
#[derive(Debug)]
pub struct Scheduler<S> {
    timers: DelayQueue<usize>,
    topics: Vec<BoundTopic<S>>,
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self {
            timers: DelayQueue::new(),
            topics: Vec::new(),
        }
    }
}

impl<S> Scheduler<S>
where
    S: MessageSink,
{
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the first timer of `topic`; it fires after one interval.
    pub fn schedule(&mut self, topic: BoundTopic<S>) {
        let key = self.topics.len();
        debug!("scheduling topic {} every {:?}", topic.id(), topic.interval());
        self.timers.insert(key, topic.interval());
        self.topics.push(topic);
    }

    /// Number of scheduled topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Ids of the scheduled topics, in scheduling order.
    pub fn topic_ids(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(BoundTopic::id)
    }

    /// Waits for the next timer to fire and returns its key.
    ///
    /// Never resolves while nothing is scheduled. Cancel safe.
    pub async fn next_due(&mut self) -> usize {
        if self.timers.is_empty() {
            return pending().await;
        }

        match self.timers.next().await {
            Some(expired) => expired.into_inner(),
            None => pending().await,
        }
    }

    /// Dispatches the topic behind `key` and re-arms its timer.
    pub async fn dispatch(&mut self, key: usize) -> Option<DispatchOutcome> {
        let topic = self.topics.get(key)?;
        let outcome = topic.on_timer_task().await;
        self.timers.insert(key, topic.interval());

        Some(outcome)
    }

    /// Waits for the next timer and dispatches it.
    pub async fn tick(&mut self) -> Option<(String, DispatchOutcome)> {
        let key = self.next_due().await;
        let outcome = self.dispatch(key).await?;

        Some((self.topics[key].id().to_string(), outcome))
    }
}
