use crate::error::PipelineError;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

/// The value threaded through a pipeline. `Value::Null` when the caller has none.
pub type Context = Value;

/// A single step of a pipeline.
#[async_trait]
pub trait Step
where
    Self: Send + Sync + 'static,
{
    /// Transforms the context produced by the previous step.
    async fn call(&self, context: Context) -> Result<Context, PipelineError>;

    /// Name used in logs and timeout errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A step backed by a synchronous function.
pub struct FnStep<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(Context) -> Result<Context, PipelineError> + Send + Sync + 'static,
{
    async fn call(&self, context: Context) -> Result<Context, PipelineError> {
        (self.f)(context)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A step backed by a function returning a future.
pub struct AsyncFnStep<F, Fut> {
    name: String,
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context, PipelineError>> + Send + 'static,
{
    async fn call(&self, context: Context) -> Result<Context, PipelineError> {
        (self.f)(context).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An ordered chain of steps.
///
/// Running the pipeline folds the steps left to right: the output of step *i* is
/// the input of step *i + 1*. The first failing step aborts the run and its error
/// is returned as is.
#[derive(Default)]
pub struct Pipeline {
    step_timeout: Option<Duration>,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every step by `limit`; a slower step fails with `PipelineError::Timeout`.
    #[must_use]
    pub const fn with_step_timeout(mut self, limit: Duration) -> Self {
        self.step_timeout = Some(limit);
        self
    }

    /// Appends a step.
    pub fn append<S: Step>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Builder form of `append`.
    #[must_use]
    pub fn step<S: Step>(mut self, step: S) -> Self {
        self.append(step);
        self
    }

    /// Appends a synchronous function as a step.
    #[must_use]
    pub fn then<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(Context) -> Result<Context, PipelineError> + Send + Sync + 'static,
    {
        self.step(FnStep {
            name: name.to_string(),
            f,
        })
    }

    /// Appends an async function as a step.
    #[must_use]
    pub fn then_async<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Context, PipelineError>> + Send + 'static,
    {
        self.step(AsyncFnStep {
            name: name.to_string(),
            f,
            _marker: PhantomData,
        })
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps in order starting from `context`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that fails.
    pub async fn run(&self, context: Context) -> Result<Context, PipelineError> {
        let mut data = context;

        for step in &self.steps {
            data = match self.step_timeout {
                Some(limit) => timeout(limit, step.call(data))
                    .await
                    .map_err(|_| PipelineError::Timeout {
                        step: step.name().to_string(),
                        limit,
                    })??,
                None => step.call(data).await?,
            };
        }

        Ok(data)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;

    fn push(tag: &'static str) -> impl Fn(Context) -> Result<Context, PipelineError> {
        move |context| {
            let mut items = context.as_array().cloned().unwrap_or_default();
            items.push(json!(tag));
            Ok(Value::Array(items))
        }
    }

    #[tokio::test]
    async fn test_steps_fold_left_to_right() {
        let pipeline = Pipeline::new()
            .then("s1", push("s1"))
            .then("s2", push("s2"))
            .then("s3", push("s3"));

        let result = pipeline.run(json!(["c0"])).await.unwrap();

        assert_eq!(result, json!(["c0", "s1", "s2", "s3"]));
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_context() {
        let pipeline = Pipeline::new();

        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run(Value::Null).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_error_aborts_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let pipeline = Pipeline::new()
            .then("fail", |_| Err(PipelineError::new("upstream timeout")))
            .then("count", move |context| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(context)
            });

        let result = pipeline.run(Value::Null).await;

        assert_eq!(result, Err(PipelineError::new("upstream timeout")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_steps() {
        let pipeline = Pipeline::new()
            .then_async("fetch", |_| async { Ok(json!({"flights": 3})) })
            .then("count", |context| Ok(context["flights"].clone()));

        assert_eq!(pipeline.run(Value::Null).await.unwrap(), json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout() {
        let pipeline = Pipeline::new()
            .with_step_timeout(Duration::from_secs(1))
            .then_async("slow", |context| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(context)
            });

        let result = pipeline.run(Value::Null).await;

        assert_matches!(result, Err(PipelineError::Timeout { step, .. }) if step == "slow");
    }

    #[tokio::test]
    async fn test_append_returns_self_for_chaining() {
        let mut pipeline = Pipeline::new();
        pipeline
            .append(FnStep {
                name: "a".to_string(),
                f: push("a"),
            })
            .append(FnStep {
                name: "b".to_string(),
                f: push("b"),
            });

        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.run(json!([])).await.unwrap(), json!(["a", "b"]));
    }
}
