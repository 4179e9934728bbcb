//! Supervision policies for child task failure handling.
//!
//! A [`TaskGroup`](crate::task_group::TaskGroup) runs in one of two modes:
//! fail-fast, where a failing child cancels its siblings and the failure
//! propagates to whoever closes or awaits the group, or supervised, where a
//! failing child is contained and reported to a handler only.

use crate::error::TaskError;
use crate::task::TaskId;

/// How a task group reacts to a failing child.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SupervisionMode {
  /// Cancel all siblings and propagate the first failure.
  #[default]
  FailFast,
  /// Contain failures; siblings keep running and the group completes normally.
  Supervised,
}

/// Report of a child task failure handed to a supervision handler.
///
/// Built when supervised work returns `Err` or panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureReport {
  /// Group the task ran in.
  pub group: String,
  /// Task that failed.
  pub task: TaskId,
  /// What it failed with.
  pub error: TaskError,
}

/// Callback receiving the failure of a supervised task.
pub type FailureHandler = Box<dyn FnOnce(FailureReport) + Send + 'static>;

/// What a child does with its own failure.
pub(crate) enum ChildPolicy {
  /// Record the failure and cancel the group.
  Propagate,
  /// Hand the failure to the handler, or log it when there is none.
  Contain(Option<FailureHandler>),
}

impl ChildPolicy {
  pub(crate) fn is_contained(&self) -> bool {
    matches!(self, ChildPolicy::Contain(_))
  }
}
