//! Built-in producers and simulated work used by the demo and the tests.

use crate::clock::delay;
use crate::error::StreamError;
use crate::record::Record;
use crate::stream::{Emitter, LazyStream, Producer};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Emits `count` records with ids `0..count`, waiting `interval` before each one.
#[derive(Debug, Clone)]
pub struct RecordProducer {
  count: u64,
  interval: Duration,
  prefix: String,
}

impl RecordProducer {
  /// Creates a producer of `count` records spaced by `interval`.
  pub fn new(count: u64, interval: Duration) -> Self {
    Self {
      count,
      interval,
      prefix: "Record".to_string(),
    }
  }

  /// Sets the payload prefix (payloads read `"{prefix} {id}"`).
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.prefix = prefix.into();
    self
  }

  /// Wraps this producer in a named lazy stream.
  pub fn into_stream(self) -> LazyStream<Record> {
    LazyStream::new(self).with_name("records")
  }
}

#[async_trait]
impl Producer<Record> for RecordProducer {
  async fn produce(&self, emitter: Emitter<Record>) -> Result<(), StreamError> {
    info!(count = self.count, interval_ms = self.interval.as_millis() as u64, "record stream started");
    for id in 0..self.count {
      delay(self.interval).await;
      emitter
        .emit(Record::new(id, format!("{} {}", self.prefix, id)))
        .await?;
    }
    Ok(())
  }
}

/// Simulated fetch: waits `latency`, then returns the payload for `id`.
pub async fn fetch_data(id: u64, latency: Duration) -> String {
  delay(latency).await;
  format!("Data {}", id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::Instant;

  #[tokio::test(start_paused = true)]
  async fn test_record_producer_emits_ids_in_order() {
    let records = RecordProducer::new(5, Duration::from_millis(500))
      .into_stream()
      .to_vec()
      .await
      .unwrap();
    let ids: Vec<u64> = records.iter().map(Record::id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(records[2].payload(), "Record 2");
  }

  #[tokio::test(start_paused = true)]
  async fn test_record_producer_paces_emissions() {
    let start = Instant::now();
    let n = RecordProducer::new(3, Duration::from_millis(500))
      .into_stream()
      .count()
      .await
      .unwrap();
    assert_eq!(n, 3);
    assert!(start.elapsed() >= Duration::from_millis(1500));
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_data_waits_for_latency() {
    let start = Instant::now();
    let data = fetch_data(4, Duration::from_millis(100)).await;
    assert_eq!(data, "Data 4");
    assert!(start.elapsed() >= Duration::from_millis(100));
  }
}
