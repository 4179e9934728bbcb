//! # Lazy Stream Test Suite

use crate::clock::delay_ms;
use crate::error::StreamError;
use crate::record::Record;
use crate::stream::{Emitter, LazyStream, StreamConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_test::{assert_err, assert_ok};

/// Producer of `0..n`, counting how many times it was started.
fn counting_stream(n: u32, started: Arc<AtomicUsize>) -> LazyStream<u32> {
  LazyStream::create(move |emitter: Emitter<u32>| {
    let started = started.clone();
    async move {
      started.fetch_add(1, Ordering::SeqCst);
      for i in 0..n {
        delay_ms(10).await;
        emitter.emit(i).await?;
      }
      Ok(())
    }
  })
}

#[tokio::test(start_paused = true)]
async fn test_building_pipeline_runs_nothing() {
  let started = Arc::new(AtomicUsize::new(0));
  let stream = counting_stream(3, started.clone())
    .map(|x| x + 1)
    .filter(|x| *x > 1);

  delay_ms(100).await;
  assert_eq!(started.load(Ordering::SeqCst), 0);
  assert_eq!(stream.stages(), &["map", "filter"]);
}

#[tokio::test(start_paused = true)]
async fn test_collect_twice_reruns_producer() {
  let started = Arc::new(AtomicUsize::new(0));
  let stream = counting_stream(4, started.clone());

  let first = stream.to_vec().await.unwrap();
  let second = stream.to_vec().await.unwrap();

  assert_eq!(started.load(Ordering::SeqCst), 2);
  assert_eq!(first, vec![0, 1, 2, 3]);
  assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_map_then_filter_preserves_order() {
  let input = vec![5u32, 2, 8, 1, 6];
  let source = input.clone();
  let stream = LazyStream::create(move |emitter: Emitter<u32>| {
    let source = source.clone();
    async move {
      for v in source {
        emitter.emit(v).await?;
      }
      Ok(())
    }
  });

  let f = |x: u32| x * 3;
  let p = |x: &u32| x % 2 == 0;
  let out = stream.map(f).filter(p).to_vec().await.unwrap();

  let expected: Vec<u32> = input.into_iter().map(f).filter(|x| p(x)).collect();
  assert_eq!(out, expected);
  assert_eq!(out, vec![6, 24, 18]);
}

#[tokio::test(start_paused = true)]
async fn test_filter_even_record_ids() {
  let stream = LazyStream::create(|emitter: Emitter<Record>| async move {
    for id in 0..5 {
      delay_ms(500).await;
      emitter.emit(Record::new(id, format!("Record {}", id))).await?;
    }
    Ok(())
  });

  let mut ids = Vec::new();
  stream
    .filter(|r| r.id() % 2 == 0)
    .collect(|r| ids.push(r.id()))
    .await
    .unwrap();
  assert_eq!(ids, vec![0, 2, 4]);
}

#[tokio::test]
async fn test_producer_error_aborts_collect() {
  let stream = LazyStream::create(|emitter: Emitter<u32>| async move {
    emitter.emit(1).await?;
    emitter.emit(2).await?;
    Err(StreamError::producer("source went away"))
  });

  let mut seen = Vec::new();
  let result = stream.collect(|v| seen.push(v)).await;
  assert_eq!(result, Err(StreamError::producer("source went away")));
  assert_eq!(seen, vec![1, 2]);
}

#[tokio::test]
async fn test_stage_error_aborts_and_stops_producer() {
  let emitted = Arc::new(AtomicUsize::new(0));
  let counter = emitted.clone();
  let stream = LazyStream::create(move |emitter: Emitter<u32>| {
    let counter = counter.clone();
    async move {
      for i in 0..100 {
        emitter.emit(i).await?;
        counter.fetch_add(1, Ordering::SeqCst);
      }
      Ok(())
    }
  })
  .try_map(|v| {
    if v == 3 {
      Err(StreamError::stage("validate", "three is not allowed"))
    } else {
      Ok(v)
    }
  });

  let mut seen = Vec::new();
  let err = assert_err!(stream.collect(|v| seen.push(v)).await);
  assert_eq!(err, StreamError::stage("validate", "three is not allowed"));
  assert_eq!(seen, vec![0, 1, 2]);
  assert!(emitted.load(Ordering::SeqCst) < 100);
}

#[tokio::test]
async fn test_empty_producer_completes() {
  let stream = LazyStream::create(|_emitter: Emitter<u32>| async move { Ok(()) });
  assert_eq!(assert_ok!(stream.count().await), 0);
}

#[tokio::test]
async fn test_buffered_config_keeps_order() {
  let stream = LazyStream::create(|emitter: Emitter<u32>| async move {
    for i in 0..50 {
      emitter.emit(i).await?;
    }
    Ok(())
  })
  .with_config(StreamConfig::default().with_name("buffered").with_buffer(16));

  assert_eq!(stream.name(), "buffered");
  let out = stream.to_vec().await.unwrap();
  assert_eq!(out, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_zero_buffer_is_clamped() {
  let config = StreamConfig::default().with_buffer(0);
  assert_eq!(config.buffer, 1);
}
