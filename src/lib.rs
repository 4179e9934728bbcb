//! # StreamScope
//!
//! Structured task groups and cold, lazily-evaluated streams on Tokio.
//!
//! StreamScope provides two building blocks:
//!
//! - **[`LazyStream`]**: a cold, restartable producer with chained `map` /
//!   `filter` stages. Nothing runs until the stream is collected, and every
//!   collection re-runs the producer from scratch.
//! - **[`TaskGroup`]**: a structured-concurrency scope that spawns child tasks,
//!   awaits them in caller order and applies a supervision policy (fail-fast
//!   cancellation of siblings, or isolated failures reported to a handler).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use streamscope::producers::RecordProducer;
//! use streamscope::task_group::TaskGroup;
//! use streamscope::GroupError;
//!
//! # async fn example() -> Result<(), GroupError> {
//! let even_ids = TaskGroup::fail_fast_scope("pipeline", |group| {
//!   Box::pin(async move {
//!     let stream = RecordProducer::new(5, Duration::from_millis(500))
//!       .into_stream()
//!       .filter(|r| r.id() % 2 == 0)
//!       .map(|r| r.id());
//!     let handle = group.spawn(async move { Ok(stream.to_vec().await?) })?;
//!     handle.join().await
//!   })
//! })
//! .await?;
//! assert_eq!(even_ids, vec![0, 2, 4]);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Delay primitive (suspension point).
pub mod clock;
/// Error types for streams, tasks and groups.
pub mod error;
/// Built-in producers and simulated work.
pub mod producers;
/// Immutable data records.
pub mod record;
/// Cold, lazily-evaluated streams.
pub mod stream;
/// Supervision policies for child task failures.
pub mod supervision;
/// Task handles, states and outcomes.
pub mod task;
/// Structured task groups.
pub mod task_group;

pub use error::{GroupError, StreamError, TaskError};
pub use record::Record;
pub use stream::{Emitter, LazyStream, Producer, StreamConfig};
pub use supervision::{FailureReport, SupervisionMode};
pub use task::{TaskHandle, TaskId, TaskOutcome, TaskState};
pub use task_group::{GroupConfig, GroupState, TaskGroup};

#[cfg(test)]
mod stream_test;
