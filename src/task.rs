//! # Task Handles
//!
//! A [`TaskHandle`] is the caller's view of one unit of work spawned into a
//! [`TaskGroup`](crate::task_group::TaskGroup). The task moves through
//! `Pending → Running → {Completed | Failed | Cancelled}`; the current
//! [`TaskState`] can be read at any time, and the terminal [`TaskOutcome`] is
//! received once and cached on the handle afterwards.

use crate::error::{GroupError, TaskError};
use std::fmt;
use tokio::sync::{oneshot, watch};

/// Identifier of a task: its spawn index within the group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
  pub(crate) fn new(index: usize) -> Self {
    Self(index)
  }

  /// Spawn index within the owning group.
  pub fn index(&self) -> usize {
    self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
  /// Spawned, not yet polled.
  Pending,
  /// Started running.
  Running,
  /// Produced a value.
  Completed,
  /// Returned an error or panicked.
  Failed,
  /// Observed a cancellation signal before finishing.
  Cancelled,
}

impl TaskState {
  /// Whether the task has finished, one way or another.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskState::Completed | TaskState::Failed | TaskState::Cancelled
    )
  }
}

/// Terminal result of a task, as a value rather than a raised error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome<T> {
  /// The work produced a value.
  Completed(T),
  /// The work failed.
  Failed(TaskError),
  /// The task was cancelled before producing a value.
  Cancelled,
}

impl<T> TaskOutcome<T> {
  /// The terminal state this outcome corresponds to.
  pub fn state(&self) -> TaskState {
    match self {
      TaskOutcome::Completed(_) => TaskState::Completed,
      TaskOutcome::Failed(_) => TaskState::Failed,
      TaskOutcome::Cancelled => TaskState::Cancelled,
    }
  }

  /// Whether the task completed with a value.
  pub fn is_completed(&self) -> bool {
    matches!(self, TaskOutcome::Completed(_))
  }

  /// Whether the task failed.
  pub fn is_failed(&self) -> bool {
    matches!(self, TaskOutcome::Failed(_))
  }

  /// Whether the task was cancelled.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, TaskOutcome::Cancelled)
  }

  /// The value, if the task completed.
  pub fn ok(self) -> Option<T> {
    match self {
      TaskOutcome::Completed(value) => Some(value),
      _ => None,
    }
  }

  /// The error, if the task failed.
  pub fn err(&self) -> Option<&TaskError> {
    match self {
      TaskOutcome::Failed(error) => Some(error),
      _ => None,
    }
  }

  /// Converts to a `Result`, attributing failures to `task`.
  pub fn into_result(self, task: TaskId) -> Result<T, GroupError> {
    match self {
      TaskOutcome::Completed(value) => Ok(value),
      TaskOutcome::Failed(source) => Err(GroupError::TaskFailed { task, source }),
      TaskOutcome::Cancelled => Err(GroupError::Cancelled { task }),
    }
  }
}

/// Handle to a task spawned into a group.
#[derive(Debug)]
pub struct TaskHandle<T> {
  id: TaskId,
  state: watch::Receiver<TaskState>,
  result: Option<oneshot::Receiver<TaskOutcome<T>>>,
  outcome: Option<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
  pub(crate) fn new(
    id: TaskId,
    state: watch::Receiver<TaskState>,
    result: oneshot::Receiver<TaskOutcome<T>>,
  ) -> Self {
    Self {
      id,
      state,
      result: Some(result),
      outcome: None,
    }
  }

  /// The task identifier.
  pub fn id(&self) -> TaskId {
    self.id
  }

  /// Current lifecycle state.
  ///
  /// A task aborted with its group reads as cancelled even before its
  /// outcome is awaited.
  pub fn state(&self) -> TaskState {
    if let Some(outcome) = &self.outcome {
      return outcome.state();
    }
    let current = *self.state.borrow();
    if !current.is_terminal() && self.state.has_changed().is_err() {
      TaskState::Cancelled
    } else {
      current
    }
  }

  /// Whether the task reached a terminal state.
  pub fn is_finished(&self) -> bool {
    self.state().is_terminal()
  }

  async fn settle(&mut self) {
    if let Some(result) = self.result.take() {
      // A dropped sender means the task was aborted along with its group.
      self.outcome = Some(result.await.unwrap_or(TaskOutcome::Cancelled));
    }
  }

  /// Waits for the task to finish and returns its outcome.
  ///
  /// The first call waits; later calls return the cached outcome.
  pub async fn outcome(&mut self) -> &TaskOutcome<T> {
    self.settle().await;
    self.outcome.get_or_insert(TaskOutcome::Cancelled)
  }

  /// Waits for the task and takes its outcome.
  pub async fn into_outcome(mut self) -> TaskOutcome<T> {
    self.settle().await;
    self.outcome.take().unwrap_or(TaskOutcome::Cancelled)
  }

  /// Waits for the task and returns its value, or the reason there is none.
  pub async fn join(self) -> Result<T, GroupError> {
    let id = self.id;
    self.into_outcome().await.into_result(id)
  }
}
