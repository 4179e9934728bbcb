use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use streamscope::clock::delay_ms;
use streamscope::producers::{RecordProducer, fetch_data};
use streamscope::{
  Emitter, GroupConfig, GroupError, LazyStream, Record, StreamError, TaskError, TaskGroup,
  TaskOutcome, TaskState,
};
use tokio::time::Instant;

// A producer that announces each run and then emits records.
fn announced_records(runs: Arc<AtomicUsize>) -> LazyStream<Record> {
  LazyStream::create(move |emitter: Emitter<Record>| {
    let runs = runs.clone();
    async move {
      runs.fetch_add(1, Ordering::SeqCst);
      for id in 0..5 {
        delay_ms(500).await;
        emitter.emit(Record::new(id, format!("Record {}", id))).await?;
      }
      Ok(())
    }
  })
}

#[tokio::test(start_paused = true)]
async fn cold_stream_repeats_side_effects() {
  let runs = Arc::new(AtomicUsize::new(0));
  let stream = announced_records(runs.clone()).map(|r| r.id());
  assert_eq!(runs.load(Ordering::SeqCst), 0);

  let first = stream.to_vec().await.unwrap();
  let second = stream.to_vec().await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 2);
  assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn even_records_survive_filter_in_order() {
  let mut kept = Vec::new();
  RecordProducer::new(5, Duration::from_millis(500))
    .into_stream()
    .filter(|r| r.id() % 2 == 0)
    .collect(|r| kept.push(r))
    .await
    .unwrap();

  let ids: Vec<u64> = kept.iter().map(Record::id).collect();
  assert_eq!(ids, vec![0, 2, 4]);
  assert!(kept.windows(2).all(|w| w[0].created_at_ms() <= w[1].created_at_ms()));
}

#[tokio::test(start_paused = true)]
async fn batch_results_follow_spawn_order() {
  let mut group = TaskGroup::new(GroupConfig::fail_fast("batch"));
  let completed = Arc::new(std::sync::Mutex::new(Vec::new()));

  let mut handles = Vec::new();
  for (id, ms) in [(1u64, 100u64), (2, 50), (3, 10)] {
    let completed = completed.clone();
    handles.push(
      group
        .spawn(async move {
          let data = fetch_data(id, Duration::from_millis(ms)).await;
          completed.lock().unwrap().push(id);
          Ok(data)
        })
        .unwrap(),
    );
  }

  let results = group.await_all(handles).await.unwrap();
  assert_eq!(results, vec!["Data 1", "Data 2", "Data 3"]);
  assert_eq!(*completed.lock().unwrap(), vec![3, 2, 1]);
  group.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn fail_fast_group_cancels_slow_siblings() {
  let mut group = TaskGroup::new(GroupConfig::fail_fast("fail-fast"));
  let slow_a = group
    .spawn(async {
      delay_ms(200).await;
      Ok(1)
    })
    .unwrap();
  let failing = group
    .spawn(async {
      delay_ms(50).await;
      Err::<i32, _>(TaskError::msg("task 2 failed"))
    })
    .unwrap();
  let slow_b = group
    .spawn(async {
      delay_ms(200).await;
      Ok(3)
    })
    .unwrap();
  let failing_id = failing.id();

  let result = group.await_all(vec![slow_a, failing, slow_b]).await;
  match result {
    Err(GroupError::TaskFailed { task, source }) => {
      assert_eq!(task, failing_id);
      assert_eq!(source, TaskError::msg("task 2 failed"));
    }
    other => panic!("expected task failure, got {:?}", other),
  }
  assert!(group.close().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn fail_fast_siblings_end_cancelled() {
  let mut group = TaskGroup::new(GroupConfig::fail_fast("fail-fast"));
  let mut slow_a = group
    .spawn(async {
      delay_ms(200).await;
      Ok(1)
    })
    .unwrap();
  let failing = group
    .spawn(async {
      delay_ms(50).await;
      Err::<i32, _>(TaskError::msg("task 2 failed"))
    })
    .unwrap();
  let mut slow_b = group
    .spawn(async {
      delay_ms(200).await;
      Ok(3)
    })
    .unwrap();

  let start = Instant::now();
  assert!(failing.into_outcome().await.is_failed());
  assert_eq!(slow_a.outcome().await, &TaskOutcome::Cancelled);
  assert_eq!(slow_b.outcome().await, &TaskOutcome::Cancelled);
  assert_eq!(slow_a.state(), TaskState::Cancelled);
  assert_eq!(slow_b.state(), TaskState::Cancelled);
  assert!(start.elapsed() < Duration::from_millis(200));
  let _ = group.close().await;
}

#[tokio::test(start_paused = true)]
async fn supervised_failure_reaches_only_handler() {
  let handled = Arc::new(AtomicUsize::new(0));
  let seen = handled.clone();

  let value = TaskGroup::supervisor_scope("supervised", move |group| {
    Box::pin(async move {
      group.run_supervised(
        async {
          delay_ms(10).await;
          Err::<(), _>(TaskError::msg("contained"))
        },
        move |report| {
          assert_eq!(report.error, TaskError::msg("contained"));
          seen.fetch_add(1, Ordering::SeqCst);
        },
      )?;
      let sibling = group.spawn(async {
        delay_ms(100).await;
        Ok("sibling done")
      })?;
      sibling.join().await
    })
  })
  .await
  .unwrap();

  assert_eq!(value, "sibling done");
  assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_error_inside_task_fails_the_task() {
  let mut group = TaskGroup::new(GroupConfig::fail_fast("stream-error"));
  let handle = group
    .spawn(async {
      let stream = LazyStream::create(|emitter: Emitter<u32>| async move {
        emitter.emit(1).await?;
        Err(StreamError::producer("disk unplugged"))
      });
      Ok(stream.to_vec().await?)
    })
    .unwrap();

  let err = handle.join().await.unwrap_err();
  assert_eq!(
    err.task_error(),
    Some(&TaskError::Stream(StreamError::producer("disk unplugged")))
  );
  assert!(group.close().await.is_err());
}
