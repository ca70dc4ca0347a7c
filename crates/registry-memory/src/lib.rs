//! In-memory Subscription Manager for tests and local runs.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use swim_registry::{ApiError, RegistryClient, SubscriptionRecord, TopicRecord};
use tracing::debug;
use uuid::Uuid;

/// Registry operations, used to target injected failures.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// `delete_subscription_by_id`
    DeleteSubscription,
    /// `delete_topic_by_id`
    DeleteTopic,
    /// `get_subscriptions`
    GetSubscriptions,
    /// `get_topics`
    GetTopics,
    /// `ping_credentials`
    PingCredentials,
    /// `post_subscription`
    PostSubscription,
    /// `post_topic`
    PostTopic,
    /// `put_subscription`
    PutSubscription,
}

/// A call received by the registry, with its main argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// `delete_subscription_by_id(id)`
    DeleteSubscription(u64),
    /// `delete_topic_by_id(id)`
    DeleteTopic(u64),
    /// `get_subscriptions(queue)`
    GetSubscriptions(String),
    /// `get_topics()`
    GetTopics,
    /// `ping_credentials()`
    PingCredentials,
    /// `post_subscription(topic_id)`
    PostSubscription(u64),
    /// `post_topic(name)`
    PostTopic(String),
    /// `put_subscription(id, record)` with the record's `active` flag.
    PutSubscription(u64, bool),
}

impl Call {
    /// The operation this call belongs to.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::DeleteSubscription(_) => Operation::DeleteSubscription,
            Self::DeleteTopic(_) => Operation::DeleteTopic,
            Self::GetSubscriptions(_) => Operation::GetSubscriptions,
            Self::GetTopics => Operation::GetTopics,
            Self::PingCredentials => Operation::PingCredentials,
            Self::PostSubscription(_) => Operation::PostSubscription,
            Self::PostTopic(_) => Operation::PostTopic,
            Self::PutSubscription(..) => Operation::PutSubscription,
        }
    }
}

/// Subscription changes, reported to observers after they are applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegistryEvent {
    /// A subscription and its queue were created.
    SubscriptionCreated {
        /// The subscribed topic.
        topic: TopicRecord,
        /// The new subscription.
        subscription: SubscriptionRecord,
    },

    /// A subscription was deleted.
    SubscriptionDeleted {
        /// The deleted subscription.
        subscription: SubscriptionRecord,
    },

    /// A subscription record was replaced.
    SubscriptionUpdated {
        /// The new record.
        subscription: SubscriptionRecord,
    },
}

type Observer = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    next_id: u64,
    observers: Vec<Observer>,
    subscriptions: BTreeMap<u64, SubscriptionRecord>,
    topics: BTreeMap<u64, TopicRecord>,
}

impl State {
    fn record(&mut self, call: Call) -> Result<(), ApiError> {
        let operation = call.operation();
        self.calls.push(call);

        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_topic(&mut self, name: &str) -> TopicRecord {
        let record = TopicRecord {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.topics.insert(record.id, record.clone());
        record
    }
}

/// An in-memory registry.
///
/// Cloning is cheap; clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryRegistry")
            .field("topics", &state.topics.len())
            .field("subscriptions", &state.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic without going through the API (nothing is journaled).
    pub fn seed_topic(&self, name: &str) -> TopicRecord {
        self.state.lock().insert_topic(name)
    }

    /// Makes the next call of `operation` fail with `error`. Failures queue up.
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Registers a callback run after every subscription change.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.state.lock().observers.push(Arc::new(observer));
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Forgets the calls received so far.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Topic names, ordered by id.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        self.state
            .lock()
            .topics
            .values()
            .map(|t| t.name.clone())
            .collect()
    }

    /// All subscriptions, ordered by id.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.state.lock().subscriptions.values().cloned().collect()
    }

    fn notify(&self, event: &RegistryEvent) {
        let observers = self.state.lock().observers.clone();
        for observer in observers {
            observer(event);
        }
    }
}

fn not_found(kind: &str, id: u64) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("{kind} with id {id} does not exist"))
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn ping_credentials(&self) -> Result<(), ApiError> {
        self.state.lock().record(Call::PingCredentials)
    }

    async fn get_topics(&self) -> Result<Vec<TopicRecord>, ApiError> {
        let mut state = self.state.lock();
        state.record(Call::GetTopics)?;
        Ok(state.topics.values().cloned().collect())
    }

    async fn post_topic(&self, name: &str) -> Result<TopicRecord, ApiError> {
        let mut state = self.state.lock();
        state.record(Call::PostTopic(name.to_string()))?;

        if state.topics.values().any(|t| t.name == name) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!("topic with name {name} already exists"),
            ));
        }

        debug!("registry: created topic {}", name);
        Ok(state.insert_topic(name))
    }

    async fn delete_topic_by_id(&self, topic_id: u64) -> Result<(), ApiError> {
        let removed = {
            let mut state = self.state.lock();
            state.record(Call::DeleteTopic(topic_id))?;

            if state.topics.remove(&topic_id).is_none() {
                return Err(not_found("topic", topic_id));
            }

            let ids: Vec<u64> = state
                .subscriptions
                .values()
                .filter(|s| s.topic_id == topic_id)
                .map(|s| s.id)
                .collect();
            ids.iter()
                .filter_map(|id| state.subscriptions.remove(id))
                .collect::<Vec<_>>()
        };

        for subscription in removed {
            self.notify(&RegistryEvent::SubscriptionDeleted { subscription });
        }

        Ok(())
    }

    async fn post_subscription(&self, topic_id: u64) -> Result<SubscriptionRecord, ApiError> {
        let (topic, subscription) = {
            let mut state = self.state.lock();
            state.record(Call::PostSubscription(topic_id))?;

            let topic = state
                .topics
                .get(&topic_id)
                .cloned()
                .ok_or_else(|| not_found("topic", topic_id))?;

            let subscription = SubscriptionRecord {
                id: state.next_id(),
                topic_id,
                queue: Uuid::new_v4().to_string(),
                active: true,
            };
            state
                .subscriptions
                .insert(subscription.id, subscription.clone());

            (topic, subscription)
        };

        self.notify(&RegistryEvent::SubscriptionCreated {
            topic,
            subscription: subscription.clone(),
        });

        Ok(subscription)
    }

    async fn get_subscriptions(&self, queue: &str) -> Result<Vec<SubscriptionRecord>, ApiError> {
        let mut state = self.state.lock();
        state.record(Call::GetSubscriptions(queue.to_string()))?;

        Ok(state
            .subscriptions
            .values()
            .filter(|s| s.queue == queue)
            .cloned()
            .collect())
    }

    async fn put_subscription(
        &self,
        subscription_id: u64,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, ApiError> {
        let subscription = {
            let mut state = self.state.lock();
            state.record(Call::PutSubscription(subscription_id, record.active))?;

            let stored = state
                .subscriptions
                .get_mut(&subscription_id)
                .ok_or_else(|| not_found("subscription", subscription_id))?;
            *stored = SubscriptionRecord {
                id: subscription_id,
                ..record.clone()
            };
            stored.clone()
        };

        self.notify(&RegistryEvent::SubscriptionUpdated {
            subscription: subscription.clone(),
        });

        Ok(subscription)
    }

    async fn delete_subscription_by_id(&self, subscription_id: u64) -> Result<(), ApiError> {
        let subscription = {
            let mut state = self.state.lock();
            state.record(Call::DeleteSubscription(subscription_id))?;

            state
                .subscriptions
                .remove(&subscription_id)
                .ok_or_else(|| not_found("subscription", subscription_id))?
        };

        self.notify(&RegistryEvent::SubscriptionDeleted { subscription });

        Ok(())
    }
}
