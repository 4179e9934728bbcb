//! # Error Types
//!
//! Errors raised while driving streams and task groups.
//!
//! - [`StreamError`] aborts a [`LazyStream`](crate::stream::LazyStream) collection.
//!   It comes from the producer or from a fallible stage.
//! - [`TaskError`] is what a unit of work spawned into a
//!   [`TaskGroup`](crate::task_group::TaskGroup) fails with.
//! - [`GroupError`] is what callers of a group observe: a child failure that
//!   propagated, a cancelled child they were waiting on, or misuse of a closed group.
//!
//! Cancellation is not an error. A cancelled task ends in
//! [`TaskOutcome::Cancelled`](crate::task::TaskOutcome::Cancelled).

use crate::task::TaskId;
use thiserror::Error;

/// Error raised by a stream producer or a transformation stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
  /// The producer failed while generating values.
  #[error("producer failed: {0}")]
  Producer(String),
  /// A transformation stage rejected a value.
  #[error("stage '{stage}' failed: {message}")]
  Stage {
    /// Name of the failing stage.
    stage: String,
    /// Error description.
    message: String,
  },
  /// The producer emitted after the collection was abandoned.
  #[error("stream closed by downstream")]
  Closed,
}

impl StreamError {
  /// Creates a producer error from any message.
  pub fn producer(message: impl Into<String>) -> Self {
    StreamError::Producer(message.into())
  }

  /// Creates a stage error.
  pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
    StreamError::Stage {
      stage: stage.into(),
      message: message.into(),
    }
  }
}

/// Error a spawned unit of work fails with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
  /// The work returned an error.
  #[error("{0}")]
  Failed(String),
  /// The work panicked; the payload message is kept when it is a string.
  #[error("task panicked: {0}")]
  Panicked(String),
  /// A stream collected inside the task aborted.
  #[error(transparent)]
  Stream(#[from] StreamError),
}

impl TaskError {
  /// Creates a plain failure from any message.
  pub fn msg(message: impl Into<String>) -> Self {
    TaskError::Failed(message.into())
  }
}

/// Error observed by the caller of a task group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
  /// A child task failed and the failure propagated to the caller.
  #[error("task {task} failed: {source}")]
  TaskFailed {
    /// The failing task.
    task: TaskId,
    /// What it failed with.
    source: TaskError,
  },
  /// The caller awaited a task that was cancelled.
  #[error("task {task} was cancelled")]
  Cancelled {
    /// The cancelled task.
    task: TaskId,
  },
  /// The group no longer accepts work.
  #[error("task group '{group}' is closed")]
  Closed {
    /// Group name.
    group: String,
  },
}

impl GroupError {
  /// Returns the task error when this is a propagated child failure.
  pub fn task_error(&self) -> Option<&TaskError> {
    match self {
      GroupError::TaskFailed { source, .. } => Some(source),
      _ => None,
    }
  }
}
