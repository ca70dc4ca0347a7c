//! Topics, the pipelines that produce their payloads, and the scheduler that
//! dispatches them periodically.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// Typed parameters bound from filter strings.
pub mod params;

/// Pipelines are ordered chains of context-transforming steps.
pub mod pipeline;

/// Periodic dispatch of bound topics.
pub mod scheduler;

/// Topics and scheduled topics.
pub mod topic;

pub use error::{PipelineError, ValidationError};
pub use params::{
    Arguments, FilterQuery, ParamKind, ParamValue, Parameter, ParameterSet, ParameterizedStep,
};
pub use pipeline::{Context, Pipeline, Step};
pub use scheduler::Scheduler;
pub use topic::{BoundTopic, DispatchOutcome, ScheduledTopic, Topic, TopicKind};
