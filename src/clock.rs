//! Delay primitive used by producers and task work.
//!
//! `delay` is a suspension point: the calling task yields its worker while it
//! waits, and a group cancellation takes effect here.

use std::time::Duration;

/// Suspends the calling task for approximately `duration`.
pub async fn delay(duration: Duration) {
  tokio::time::sleep(duration).await;
}

/// Suspends the calling task for approximately `ms` milliseconds.
pub async fn delay_ms(ms: u64) {
  delay(Duration::from_millis(ms)).await;
}
