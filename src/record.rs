//! # Record
//!
//! Immutable value produced by the record generator. Every generation step
//! builds a fresh record stamped with its creation time; transformations build
//! new records instead of mutating existing ones.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A generated data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  id: u64,
  payload: String,
  created_at_ms: i64,
}

impl Record {
  /// Creates a record stamped with the current wall-clock time (ms since UNIX epoch).
  #[must_use]
  pub fn new(id: u64, payload: impl Into<String>) -> Self {
    Self {
      id,
      payload: payload.into(),
      created_at_ms: Utc::now().timestamp_millis(),
    }
  }

  /// Record identifier.
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Record payload.
  pub fn payload(&self) -> &str {
    &self.payload
  }

  /// Creation timestamp in milliseconds since the UNIX epoch.
  pub fn created_at_ms(&self) -> i64 {
    self.created_at_ms
  }

  /// Returns a new record with the same id and a payload derived from this one.
  ///
  /// The new record gets its own creation timestamp.
  #[must_use]
  pub fn map_payload<F>(&self, f: F) -> Self
  where
    F: FnOnce(&str) -> String,
  {
    Self::new(self.id, f(&self.payload))
  }
}
