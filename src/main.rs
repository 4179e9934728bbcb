//! StreamScope demo.
//!
//! Runs, inside one top-level fail-fast group:
//!
//! 1. a parallel batch of simulated fetches awaited in spawn order,
//! 2. a record stream filtered to even ids, collected twice to show that each
//!    collection re-runs the producer,
//! 3. a supervised group where one child fails without affecting its siblings,
//! 4. a Result-style inspection of a failing task.
//!
//! Exits non-zero if an error propagates out of the top-level group.

use std::time::Duration;
use streamscope::producers::{RecordProducer, fetch_data};
use streamscope::{GroupConfig, GroupError, Record, TaskError, TaskGroup, TaskOutcome};
use tokio::time::Instant;
use tracing::info;

/// Knobs for the demo sequences.
#[derive(Debug, Clone)]
struct DemoConfig {
  record_count: u64,
  record_interval: Duration,
  fetch_delays: Vec<u64>,
}

impl Default for DemoConfig {
  fn default() -> Self {
    Self {
      record_count: 5,
      record_interval: Duration::from_millis(500),
      fetch_delays: vec![100, 50, 10],
    }
  }
}

async fn parallel_batch(group: &mut TaskGroup, config: &DemoConfig) -> Result<(), GroupError> {
  println!("== parallel batch");
  let start = Instant::now();
  let mut handles = Vec::with_capacity(config.fetch_delays.len());
  for (id, ms) in config.fetch_delays.iter().copied().enumerate() {
    handles.push(group.spawn(async move {
      Ok(fetch_data(id as u64 + 1, Duration::from_millis(ms)).await)
    })?);
  }
  let results = group.await_all(handles).await?;
  println!("results: {:?}", results);
  println!("elapsed: {} ms", start.elapsed().as_millis());
  Ok(())
}

async fn stream_pipeline(group: &mut TaskGroup, config: &DemoConfig) -> Result<(), GroupError> {
  println!("== stream pipeline");
  let evens = RecordProducer::new(config.record_count, config.record_interval)
    .into_stream()
    .filter(|record| record.id() % 2 == 0)
    .map(|record: Record| record.map_payload(|payload| payload.to_uppercase()));

  for pass in 1..=2 {
    let stream = evens.clone();
    let handle = group.spawn(async move {
      let mut lines = Vec::new();
      stream
        .collect(|record| {
          lines.push(serde_json::to_string(&record).unwrap_or_else(|e| format!("<unserializable: {}>", e)))
        })
        .await?;
      Ok(lines)
    })?;
    for line in handle.join().await? {
      println!("pass {}: {}", pass, line);
    }
  }
  Ok(())
}

async fn supervised_group() -> Result<(), GroupError> {
  println!("== supervised group");
  TaskGroup::supervisor_scope("supervised", |group| {
    Box::pin(async move {
      let failing = group.run_supervised(
        async {
          streamscope::clock::delay_ms(100).await;
          Err::<String, _>(TaskError::msg("simulated failure"))
        },
        |report| println!("handler: task {} failed: {}", report.task, report.error),
      )?;
      let healthy = group.spawn(async { Ok(fetch_data(7, Duration::from_millis(200)).await) })?;

      let outcomes = group.await_all_settled(vec![failing, healthy]).await;
      for outcome in outcomes {
        match outcome {
          TaskOutcome::Completed(value) => println!("completed: {}", value),
          TaskOutcome::Failed(error) => println!("contained: {}", error),
          TaskOutcome::Cancelled => println!("cancelled"),
        }
      }
      Ok::<_, GroupError>(())
    })
  })
  .await
}

async fn inspect_result(group: &mut TaskGroup) -> Result<(), GroupError> {
  println!("== result inspection");
  let handle = group.run_supervised(
    async { Err::<u32, _>(TaskError::msg("division by zero")) },
    |report| info!(task = %report.task, "failure routed to inspection handler"),
  )?;
  match handle.into_outcome().await {
    TaskOutcome::Completed(value) => println!("value: {}", value),
    TaskOutcome::Failed(error) => println!("caught: {}", error),
    TaskOutcome::Cancelled => println!("cancelled"),
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GroupError> {
  tracing_subscriber::fmt::init();
  let config = DemoConfig::default();
  info!(?config, "starting demo");

  TaskGroup::run(GroupConfig::fail_fast("main"), |group| {
    Box::pin(async move {
      parallel_batch(group, &config).await?;
      stream_pipeline(group, &config).await?;
      supervised_group().await?;
      inspect_result(group).await
    })
  })
  .await
}
