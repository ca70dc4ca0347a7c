use std::time::Duration;

use thiserror::Error;

/// Raised synchronously when a topic, pipeline step or parameter is malformed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Topic ids must not be empty.
    #[error("topic id must not be empty")]
    EmptyTopicId,

    /// Filter strings are `name=value` pairs joined by `&`.
    #[error("invalid filter '{0}' - expected 'name1=value1&name2=value2'")]
    InvalidFilter(String),

    /// Topic ids are routing keys and must not contain wildcards or whitespace.
    #[error("invalid topic id '{0}' - must not contain '*', '#', '>' or whitespace")]
    InvalidTopicId(String),

    /// A value could not be cast to the parameter's type.
    #[error("unable to cast '{value}' to {kind} for parameter '{name}'")]
    InvalidValue {
        /// Parameter name.
        name: String,
        /// Raw value.
        value: String,
        /// Expected type.
        kind: &'static str,
    },

    /// A parameter without default was not supplied.
    #[error("required argument '{0}' is missing")]
    MissingParameter(String),

    /// The filter names a parameter the step does not declare.
    #[error("unexpected argument '{0}'")]
    UnknownParameter(String),

    /// Scheduled topics need a positive interval.
    #[error("interval of topic '{0}' must be greater than zero")]
    ZeroInterval(String),
}

/// Raised by a pipeline step when it cannot produce data.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The step reported a failure.
    #[error("{0}")]
    Step(String),

    /// The step did not finish within the pipeline's step timeout.
    #[error("step {step} timed out after {limit:?}")]
    Timeout {
        /// Name of the step.
        step: String,
        /// Configured limit.
        limit: Duration,
    },
}

impl PipelineError {
    /// Creates a step failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Step(error.to_string())
    }
}
