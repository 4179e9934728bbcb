//! # Task Groups
//!
//! A [`TaskGroup`] is a structured-concurrency scope: it owns every task
//! spawned into it and does not finish until all of them have reached a
//! terminal state.
//!
//! ## Lifecycle
//!
//! `Open → Closing → Closed`. While open the group accepts work.
//! [`close`](TaskGroup::close) waits for every child and then reports the
//! group's result. A closed group rejects further spawns. Dropping a group
//! that was never closed cancels its children and aborts them.
//!
//! ## Supervision
//!
//! In [`SupervisionMode::FailFast`] a child that fails cancels the whole
//! group: siblings observe the cancellation at their next suspension point
//! and end as [`TaskOutcome::Cancelled`]. The failure is returned from
//! [`await_all`](TaskGroup::await_all) and [`close`](TaskGroup::close).
//!
//! Work started with [`run_supervised`](TaskGroup::run_supervised), and all
//! work in a [`SupervisionMode::Supervised`] group, is contained instead: its
//! failure goes to the supplied handler, or to the log when there is none.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use streamscope::producers::fetch_data;
//! use streamscope::task_group::{GroupConfig, TaskGroup};
//!
//! # async fn example() -> Result<(), streamscope::GroupError> {
//! let mut group = TaskGroup::new(GroupConfig::fail_fast("fetch"));
//! let a = group.spawn(async { Ok(fetch_data(1, Duration::from_millis(100)).await) })?;
//! let b = group.spawn(async { Ok(fetch_data(2, Duration::from_millis(50)).await) })?;
//! let results = group.await_all(vec![a, b]).await?;
//! assert_eq!(results, vec!["Data 1", "Data 2"]);
//! group.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{GroupError, TaskError};
use crate::supervision::{ChildPolicy, FailureHandler, FailureReport, SupervisionMode};
use crate::task::{TaskHandle, TaskId, TaskOutcome, TaskState};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for a task group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
  /// Name used in logs and errors.
  pub name: String,
  /// How child failures are handled.
  pub mode: SupervisionMode,
}

impl Default for GroupConfig {
  fn default() -> Self {
    Self {
      name: "group".to_string(),
      mode: SupervisionMode::FailFast,
    }
  }
}

impl GroupConfig {
  /// A fail-fast group named `name`.
  pub fn fail_fast(name: impl Into<String>) -> Self {
    Self::default().with_name(name)
  }

  /// A supervised group named `name`.
  pub fn supervised(name: impl Into<String>) -> Self {
    Self::default()
      .with_name(name)
      .with_mode(SupervisionMode::Supervised)
  }

  /// Sets the group name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Sets the supervision mode.
  pub fn with_mode(mut self, mode: SupervisionMode) -> Self {
    self.mode = mode;
    self
  }
}

/// Lifecycle state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
  /// Accepting work.
  Open,
  /// Waiting for children to finish.
  Closing,
  /// All children finished.
  Closed,
}

/// First propagated failure, lowest spawn index winning ties.
type FailureSlot = Arc<Mutex<Option<(TaskId, TaskError)>>>;

/// Structured scope owning a set of concurrently running tasks.
pub struct TaskGroup {
  name: Arc<str>,
  mode: SupervisionMode,
  state: GroupState,
  token: CancellationToken,
  tasks: JoinSet<()>,
  spawned: usize,
  failure: FailureSlot,
}

impl std::fmt::Debug for TaskGroup {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskGroup")
      .field("name", &self.name)
      .field("mode", &self.mode)
      .field("state", &self.state)
      .field("spawned", &self.spawned)
      .field("cancelled", &self.token.is_cancelled())
      .finish()
  }
}

impl TaskGroup {
  /// Opens a new group.
  pub fn new(config: GroupConfig) -> Self {
    debug!(group = %config.name, mode = ?config.mode, "task group opened");
    Self {
      name: Arc::from(config.name),
      mode: config.mode,
      state: GroupState::Open,
      token: CancellationToken::new(),
      tasks: JoinSet::new(),
      spawned: 0,
      failure: Arc::new(Mutex::new(None)),
    }
  }

  /// Opens a group, runs `body` in it and closes it.
  ///
  /// The group is always closed before this returns, so no child outlives the
  /// call. If `body` fails, the group is cancelled first and `body`'s error wins.
  pub async fn run<R, F>(config: GroupConfig, body: F) -> Result<R, GroupError>
  where
    F: for<'g> FnOnce(&'g mut TaskGroup) -> BoxFuture<'g, Result<R, GroupError>>,
  {
    let mut group = TaskGroup::new(config);
    let result = body(&mut group).await;
    if result.is_err() {
      group.cancel();
    }
    let closed = group.close().await;
    let value = result?;
    closed?;
    Ok(value)
  }

  /// Shorthand for [`run`](Self::run) with a fail-fast group.
  pub async fn fail_fast_scope<R, F>(name: &str, body: F) -> Result<R, GroupError>
  where
    F: for<'g> FnOnce(&'g mut TaskGroup) -> BoxFuture<'g, Result<R, GroupError>>,
  {
    Self::run(GroupConfig::fail_fast(name), body).await
  }

  /// Shorthand for [`run`](Self::run) with a supervised group.
  pub async fn supervisor_scope<R, F>(name: &str, body: F) -> Result<R, GroupError>
  where
    F: for<'g> FnOnce(&'g mut TaskGroup) -> BoxFuture<'g, Result<R, GroupError>>,
  {
    Self::run(GroupConfig::supervised(name), body).await
  }

  /// Group name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Supervision mode.
  pub fn mode(&self) -> SupervisionMode {
    self.mode
  }

  /// Lifecycle state.
  pub fn state(&self) -> GroupState {
    self.state
  }

  /// Number of tasks spawned so far.
  pub fn len(&self) -> usize {
    self.spawned
  }

  /// Whether nothing has been spawned yet.
  pub fn is_empty(&self) -> bool {
    self.spawned == 0
  }

  /// Number of children the group still holds. Finished children are
  /// released on the next spawn or on close.
  pub fn tracked(&self) -> usize {
    self.tasks.len()
  }

  /// Whether the group has been cancelled.
  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Signals cancellation to every child.
  ///
  /// Children stop at their next suspension point. Children spawned after this
  /// end as cancelled without running.
  pub fn cancel(&self) {
    if !self.token.is_cancelled() {
      info!(group = %self.name, "cancelling task group");
      self.token.cancel();
    }
  }

  /// Spawns `work` into the group and returns its handle without waiting.
  ///
  /// In a fail-fast group a failure of `work` cancels the group. In a
  /// supervised group it is logged and contained.
  pub fn spawn<T, F>(&mut self, work: F) -> Result<TaskHandle<T>, GroupError>
  where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
  {
    let policy = match self.mode {
      SupervisionMode::FailFast => ChildPolicy::Propagate,
      SupervisionMode::Supervised => ChildPolicy::Contain(None),
    };
    self.spawn_child(work, policy)
  }

  /// Spawns `work` with its failure isolated from the group.
  ///
  /// A failure neither cancels siblings nor reaches `close`; it is handed to
  /// `on_failure` only.
  pub fn run_supervised<T, F, H>(&mut self, work: F, on_failure: H) -> Result<TaskHandle<T>, GroupError>
  where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
    H: FnOnce(FailureReport) + Send + 'static,
  {
    let handler: FailureHandler = Box::new(on_failure);
    self.spawn_child(work, ChildPolicy::Contain(Some(handler)))
  }

  fn spawn_child<T, F>(&mut self, work: F, policy: ChildPolicy) -> Result<TaskHandle<T>, GroupError>
  where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
  {
    if self.state != GroupState::Open {
      return Err(GroupError::Closed {
        group: self.name.to_string(),
      });
    }

    while let Some(joined) = self.tasks.try_join_next() {
      if let Err(e) = joined {
        warn!(group = %self.name, error = %e, "child task did not finish cleanly");
      }
    }

    let id = TaskId::new(self.spawned);
    self.spawned += 1;
    debug!(group = %self.name, task = %id, supervised = policy.is_contained(), "spawning task");

    let (state_tx, state_rx) = watch::channel(TaskState::Pending);
    let (result_tx, result_rx) = oneshot::channel();
    let child = ChildContext {
      id,
      group: self.name.clone(),
      token: self.token.clone(),
      failure: self.failure.clone(),
    };

    self.tasks.spawn(async move {
      state_tx.send_replace(TaskState::Running);
      let outcome = if child.token.is_cancelled() {
        TaskOutcome::Cancelled
      } else {
        // Work that is ready on the wake-up poll keeps its own result.
        tokio::select! {
          biased;
          result = AssertUnwindSafe(work).catch_unwind() => match result {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(error)) => TaskOutcome::Failed(error),
            Err(panic) => TaskOutcome::Failed(TaskError::Panicked(panic_message(panic.as_ref()))),
          },
          _ = child.token.cancelled() => TaskOutcome::Cancelled,
        }
      };
      if let Some(error) = outcome.err().cloned() {
        child.report_failure(error, policy).await;
      }
      debug!(group = %child.group, task = %child.id, state = ?outcome.state(), "task finished");
      state_tx.send_replace(outcome.state());
      // The handle may already be gone; the outcome is then unobserved.
      let _ = result_tx.send(outcome);
    });

    Ok(TaskHandle::new(id, state_rx, result_rx))
  }

  /// Waits for every handle and returns their values in input order.
  ///
  /// In a fail-fast group a failing child has already cancelled the group by
  /// the time its handle settles. The call waits until every handle is
  /// terminal, then returns the failure of the lowest spawn index. A handle
  /// that was cancelled without any failure yields [`GroupError::Cancelled`].
  /// Awaiting a contained handle returns its failure without cancelling anything.
  pub async fn await_all<T>(&self, handles: Vec<TaskHandle<T>>) -> Result<Vec<T>, GroupError>
  where
    T: Send + 'static,
  {
    let mut pending: FuturesUnordered<_> = handles
      .into_iter()
      .enumerate()
      .map(|(index, handle)| async move {
        let id = handle.id();
        (index, id, handle.into_outcome().await)
      })
      .collect();

    let mut settled = Vec::with_capacity(pending.len());
    while let Some((index, id, outcome)) = pending.next().await {
      if outcome.is_failed() {
        debug!(group = %self.name, task = %id, "awaited task failed");
      }
      settled.push((index, id, outcome));
    }
    settled.sort_by_key(|(index, _, _)| *index);

    let first_failure = settled
      .iter()
      .filter_map(|(_, id, outcome)| outcome.err().map(|error| (*id, error)))
      .min_by_key(|(id, _)| *id);
    if let Some((task, error)) = first_failure {
      return Err(GroupError::TaskFailed {
        task,
        source: error.clone(),
      });
    }

    settled
      .into_iter()
      .map(|(_, id, outcome)| outcome.into_result(id))
      .collect()
  }

  /// Waits for every handle and returns the outcomes in input order.
  ///
  /// Never raises and never cancels: failures and cancellations come back as values.
  pub async fn await_all_settled<T>(&self, handles: Vec<TaskHandle<T>>) -> Vec<TaskOutcome<T>>
  where
    T: Send + 'static,
  {
    futures::future::join_all(handles.into_iter().map(TaskHandle::into_outcome)).await
  }

  /// Waits for every child to finish and closes the group.
  ///
  /// Returns the first propagated child failure of a fail-fast group. Closing
  /// a group twice is an error.
  pub async fn close(&mut self) -> Result<(), GroupError> {
    if self.state != GroupState::Open {
      return Err(GroupError::Closed {
        group: self.name.to_string(),
      });
    }

    self.state = GroupState::Closing;
    info!(group = %self.name, children = self.spawned, "closing task group");
    while let Some(joined) = self.tasks.join_next().await {
      if let Err(e) = joined {
        warn!(group = %self.name, error = %e, "child task did not finish cleanly");
      }
    }
    self.state = GroupState::Closed;
    info!(group = %self.name, cancelled = self.token.is_cancelled(), "task group closed");

    match self.failure.lock().await.take() {
      Some((task, source)) => Err(GroupError::TaskFailed { task, source }),
      None => Ok(()),
    }
  }
}

impl Drop for TaskGroup {
  fn drop(&mut self) {
    if self.state != GroupState::Closed && !self.tasks.is_empty() {
      warn!(group = %self.name, "task group dropped before close, aborting children");
      self.token.cancel();
    }
  }
}

/// What a spawned child needs from its group.
struct ChildContext {
  id: TaskId,
  group: Arc<str>,
  token: CancellationToken,
  failure: FailureSlot,
}

impl ChildContext {
  async fn report_failure(&self, error: TaskError, policy: ChildPolicy) {
    match policy {
      ChildPolicy::Propagate => {
        warn!(group = %self.group, task = %self.id, error = %error, "task failed, cancelling group");
        {
          let mut slot = self.failure.lock().await;
          let earlier = matches!(slot.as_ref(), Some((first, _)) if *first < self.id);
          if !earlier {
            *slot = Some((self.id, error));
          }
        }
        self.token.cancel();
      }
      ChildPolicy::Contain(Some(handler)) => {
        debug!(group = %self.group, task = %self.id, error = %error, "supervised task failed");
        handler(FailureReport {
          group: self.group.to_string(),
          task: self.id,
          error,
        });
      }
      ChildPolicy::Contain(None) => {
        warn!(group = %self.group, task = %self.id, error = %error, "unhandled supervised task failure");
      }
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
