use crate::error::{PipelineError, ValidationError};
use crate::pipeline::{Context, Pipeline};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use swim_broker::{Message, MessageSink, SendOutcome};
use tracing::{error, info};

/// What happened on one dispatch of a topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pipeline failed; nothing was sent this cycle.
    PipelineFailed,

    /// The pipeline ran but the sender had no credit.
    NoCredit,

    /// The pipeline ran but the transport rejected the message.
    SendFailed,

    /// The message was sent.
    Sent,
}

impl From<SendOutcome> for DispatchOutcome {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Sent => Self::Sent,
            SendOutcome::NoCredit => Self::NoCredit,
            SendOutcome::Failed => Self::SendFailed,
        }
    }
}

/// A named unit of publishable data.
#[derive(Clone)]
pub struct Topic {
    id: String,
    pipeline: Arc<Pipeline>,
}

impl Topic {
    /// Creates a topic. The id doubles as the routing key of its messages.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the id is empty or contains wildcards or
    /// whitespace.
    pub fn new(id: impl Into<String>, pipeline: Pipeline) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ValidationError::EmptyTopicId);
        }

        if id.contains(['*', '#', '>']) || id.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidTopicId(id));
        }

        Ok(Self {
            id,
            pipeline: Arc::new(pipeline),
        })
    }

    /// The topic id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The topic's pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Runs the pipeline starting from `context`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub async fn run_pipeline(&self, context: Context) -> Result<Context, PipelineError> {
        self.pipeline.run(context).await
    }

    /// Runs the pipeline and hands the result to `sink` under this topic's id.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error; nothing is sent in that case.
    pub async fn dispatch<S>(&self, sink: &S, context: Context) -> Result<SendOutcome, PipelineError>
    where
        S: MessageSink + ?Sized,
    {
        let data = self.run_pipeline(context).await?;

        Ok(sink.send_message(Message::from(data), &self.id, None).await)
    }

    /// Turns this topic into one dispatched every `interval`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ZeroInterval` if `interval` is zero.
    pub fn every(self, interval: Duration) -> Result<ScheduledTopic, ValidationError> {
        if interval.is_zero() {
            return Err(ValidationError::ZeroInterval(self.id));
        }

        Ok(ScheduledTopic {
            topic: self,
            interval,
        })
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("id", &self.id)
            .field("steps", &self.pipeline.len())
            .finish()
    }
}

/// A topic that is dispatched periodically once bound to a sink.
#[derive(Clone, Debug)]
pub struct ScheduledTopic {
    interval: Duration,
    topic: Topic,
}

impl ScheduledTopic {
    /// Creates a scheduled topic.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a bad id or a zero interval.
    pub fn new(
        id: impl Into<String>,
        pipeline: Pipeline,
        interval: Duration,
    ) -> Result<Self, ValidationError> {
        Topic::new(id, pipeline)?.every(interval)
    }

    /// The topic id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.topic.id()
    }

    /// Time between two dispatches.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// The underlying topic.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Binds the topic to the sink its messages go to. Only bound topics can be
    /// scheduled.
    pub const fn bind<S>(self, sink: S) -> BoundTopic<S>
    where
        S: MessageSink,
    {
        BoundTopic { sink, topic: self }
    }
}

/// A scheduled topic together with the sink it sends to.
#[derive(Debug)]
pub struct BoundTopic<S> {
    sink: S,
    topic: ScheduledTopic,
}

impl<S> BoundTopic<S>
where
    S: MessageSink,
{
    /// The topic id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.topic.id()
    }

    /// Time between two dispatches.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.topic.interval()
    }

    /// One timer fire: run the pipeline and send the result.
    ///
    /// Pipeline failures are logged and the cycle is skipped; the caller keeps
    /// the topic scheduled either way.
    pub async fn on_timer_task(&self) -> DispatchOutcome {
        match self.topic.topic.dispatch(&self.sink, Value::Null).await {
            Ok(outcome) => {
                info!("Dispatched scheduled topic {}: {:?}", self.id(), outcome);
                outcome.into()
            }
            Err(e) => {
                error!("Error while getting data of scheduled topic {}: {}", self.id(), e);
                DispatchOutcome::PipelineFailed
            }
        }
    }
}

/// Either kind of topic a publisher can hold.
#[derive(Clone, Debug)]
pub enum TopicKind {
    /// Dispatched only when triggered.
    OnDemand(Topic),

    /// Dispatched on a timer.
    Scheduled(ScheduledTopic),
}

impl TopicKind {
    /// The topic id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.topic().id()
    }

    /// The underlying topic.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        match self {
            Self::OnDemand(topic) => topic,
            Self::Scheduled(scheduled) => scheduled.topic(),
        }
    }
}

impl From<Topic> for TopicKind {
    fn from(topic: Topic) -> Self {
        Self::OnDemand(topic)
    }
}

impl From<ScheduledTopic> for TopicKind {
    fn from(topic: ScheduledTopic) -> Self {
        Self::Scheduled(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingSink {
        outcome: Option<SendOutcome>,
        sent: Mutex<Vec<(Message, String)>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send_message(
            &self,
            message: Message,
            subject: &str,
            _content_type: Option<&str>,
        ) -> SendOutcome {
            self.sent.lock().unwrap().push((message, subject.to_string()));
            self.outcome.unwrap_or(SendOutcome::Sent)
        }
    }

    #[test]
    fn test_topic_id_validation() {
        assert_matches!(Topic::new("", Pipeline::new()), Err(ValidationError::EmptyTopicId));
        assert_matches!(
            Topic::new("arrivals.*", Pipeline::new()),
            Err(ValidationError::InvalidTopicId(_))
        );
        assert_matches!(
            Topic::new("arrivals brussels", Pipeline::new()),
            Err(ValidationError::InvalidTopicId(_))
        );
        assert!(Topic::new("arrivals.brussels", Pipeline::new()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ScheduledTopic::new("arrivals", Pipeline::new(), Duration::ZERO);

        assert_eq!(
            result.unwrap_err(),
            ValidationError::ZeroInterval("arrivals".to_string())
        );
    }

    #[tokio::test]
    async fn test_run_pipeline_delegates() {
        let topic = Topic::new(
            "arrivals",
            Pipeline::new().then("wrap", |context| Ok(json!({ "airport": context }))),
        )
        .unwrap();

        let result = topic.run_pipeline(json!("EBBR")).await.unwrap();

        assert_eq!(result, json!({"airport": "EBBR"}));
    }

    #[tokio::test]
    async fn test_dispatch_sends_under_topic_id() {
        let sink = RecordingSink::default();
        let topic = Topic::new("arrivals", Pipeline::new().then("data", |_| Ok(json!([1, 2]))))
            .unwrap();

        let outcome = topic.dispatch(&sink, Value::Null).await.unwrap();

        assert_eq!(outcome, SendOutcome::Sent);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "arrivals");
        assert_eq!(sent[0].0.body, "[1,2]");
    }

    #[traced_test]
    #[tokio::test]
    async fn test_timer_task_skips_on_pipeline_error() {
        let topic = ScheduledTopic::new(
            "arrivals",
            Pipeline::new().then("fail", |_| Err(PipelineError::new("upstream down"))),
            Duration::from_secs(1),
        )
        .unwrap()
        .bind(Arc::new(RecordingSink::default()));

        let outcome = topic.on_timer_task().await;

        assert_eq!(outcome, DispatchOutcome::PipelineFailed);
        assert!(topic.sink.sent.lock().unwrap().is_empty());
        assert!(logs_contain(
            "Error while getting data of scheduled topic arrivals: upstream down"
        ));
    }

    #[tokio::test]
    async fn test_timer_task_reports_no_credit() {
        let sink = RecordingSink {
            outcome: Some(SendOutcome::NoCredit),
            ..RecordingSink::default()
        };
        let topic = ScheduledTopic::new("arrivals", Pipeline::new(), Duration::from_secs(1))
            .unwrap()
            .bind(sink);

        assert_eq!(topic.on_timer_task().await, DispatchOutcome::NoCredit);
    }

    #[test]
    fn test_topic_kind_id() {
        let on_demand = TopicKind::from(Topic::new("a", Pipeline::new()).unwrap());
        let scheduled = TopicKind::from(
            ScheduledTopic::new("b", Pipeline::new(), Duration::from_secs(1)).unwrap(),
        );

        assert_eq!(on_demand.id(), "a");
        assert_eq!(scheduled.id(), "b");
    }
}
