use serde::{Deserialize, Serialize};

/// A topic as stored in the registry.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TopicRecord {
    /// Registry-assigned id.
    pub id: u64,

    /// Topic name; equals the publisher's topic id.
    pub name: String,
}

/// A subscription as stored in the registry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubscriptionRecord {
    /// Registry-assigned id.
    pub id: u64,

    /// Id of the subscribed topic.
    pub topic_id: u64,

    /// Registry-issued queue the subscriber consumes from.
    pub queue: String,

    /// Whether messages are routed to the queue.
    pub active: bool,
}
