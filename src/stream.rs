//! # Lazy Streams
//!
//! A [`LazyStream`] is a cold, restartable pipeline: a producer plus an ordered
//! chain of transformation stages. Building the pipeline does no work. Every
//! call to [`LazyStream::collect`] runs the producer from scratch, pushes each
//! emitted value through the stages in declaration order and hands the
//! survivors to the consumer.
//!
//! ## Producers
//!
//! A producer receives an [`Emitter`] and pushes values through it, suspending
//! as it likes, then returns. Structs implement [`Producer`] and go through
//! [`LazyStream::new`]; async closures go through [`LazyStream::create`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use streamscope::clock::delay;
//! use streamscope::stream::{Emitter, LazyStream};
//!
//! # async fn example() -> Result<(), streamscope::StreamError> {
//! let numbers = LazyStream::create(|emitter: Emitter<u32>| async move {
//!   for n in 0..5 {
//!     delay(Duration::from_millis(10)).await;
//!     emitter.emit(n).await?;
//!   }
//!   Ok(())
//! });
//!
//! let evens = numbers.filter(|n| n % 2 == 0).map(|n| n * 10).to_vec().await?;
//! assert_eq!(evens, vec![0, 20, 40]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! A producer returning `Err`, or a [`try_map`](LazyStream::try_map) stage
//! returning `Err`, aborts the collection immediately. The error reaches the
//! caller of `collect` and the producer is dropped at its current suspension point.

use crate::error::StreamError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Configuration for a lazy stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
  /// Optional name used in logs.
  pub name: Option<String>,
  /// Capacity of the channel between producer and pipeline. Never below 1.
  pub buffer: usize,
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self {
      name: None,
      buffer: 1,
    }
  }
}

impl StreamConfig {
  /// Sets the stream name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the producer channel capacity (clamped to at least 1).
  pub fn with_buffer(mut self, buffer: usize) -> Self {
    self.buffer = buffer.max(1);
    self
  }
}

/// Handle a producer pushes values through.
pub struct Emitter<T> {
  tx: mpsc::Sender<T>,
}

impl<T: Send> Emitter<T> {
  /// Emits one value downstream.
  ///
  /// Suspends while the pipeline is still busy with earlier values. Fails with
  /// [`StreamError::Closed`] once the collection has been abandoned.
  pub async fn emit(&self, value: T) -> Result<(), StreamError> {
    self.tx.send(value).await.map_err(|_| StreamError::Closed)
  }
}

/// Source of values for a [`LazyStream`].
///
/// `produce` is called once per collection and must emit every value through
/// the emitter before returning.
#[async_trait]
pub trait Producer<T: Send + 'static>: Send + Sync {
  /// Emits the full sequence through `emitter`.
  async fn produce(&self, emitter: Emitter<T>) -> Result<(), StreamError>;
}

/// Producer backed by an async closure, see [`LazyStream::create`].
struct FnProducer<F>(F);

#[async_trait]
impl<T, F, Fut> Producer<T> for FnProducer<F>
where
  T: Send + 'static,
  F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
  async fn produce(&self, emitter: Emitter<T>) -> Result<(), StreamError> {
    (self.0)(emitter).await
  }
}

type Source<T> = Arc<dyn Fn(&StreamConfig) -> BoxStream<'static, Result<T, StreamError>> + Send + Sync>;

enum Step<T> {
  Item(T),
  Finished(Result<(), StreamError>),
  Drained,
}

/// Runs one fresh execution of `producer`, exposed as a pull stream.
fn open<T, P>(producer: Arc<P>, buffer: usize) -> BoxStream<'static, Result<T, StreamError>>
where
  T: Send + 'static,
  P: Producer<T> + ?Sized + 'static,
{
  let (tx, mut rx) = mpsc::channel(buffer.max(1));
  Box::pin(async_stream::stream! {
    let producing = async move { producer.produce(Emitter { tx }).await };
    tokio::pin!(producing);
    let mut finished = false;
    loop {
      // Buffered values go out before the producer's result is looked at.
      let step = tokio::select! {
        biased;
        item = rx.recv() => match item {
          Some(value) => Step::Item(value),
          None => Step::Drained,
        },
        result = &mut producing, if !finished => Step::Finished(result),
      };
      match step {
        Step::Item(value) => yield Ok(value),
        Step::Finished(Ok(())) => finished = true,
        Step::Finished(Err(e)) => {
          yield Err(e);
          break;
        }
        Step::Drained => break,
      }
    }
  })
}

/// A cold, lazily-evaluated stream of `T`.
pub struct LazyStream<T> {
  source: Source<T>,
  stages: Vec<&'static str>,
  config: StreamConfig,
}

impl<T> Clone for LazyStream<T> {
  fn clone(&self) -> Self {
    Self {
      source: self.source.clone(),
      stages: self.stages.clone(),
      config: self.config.clone(),
    }
  }
}

impl<T> LazyStream<T> {
  /// The stream name, `"stream"` when none was set.
  pub fn name(&self) -> &str {
    self.config.name.as_deref().unwrap_or("stream")
  }

  /// Pending stages in declaration order.
  pub fn stages(&self) -> &[&'static str] {
    &self.stages
  }
}

impl<T> std::fmt::Debug for LazyStream<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LazyStream")
      .field("name", &self.name())
      .field("stages", &self.stages)
      .field("buffer", &self.config.buffer)
      .finish()
  }
}

impl<T: Send + 'static> LazyStream<T> {
  /// Creates a stream over `producer`. Nothing runs until the stream is collected.
  pub fn new<P>(producer: P) -> Self
  where
    P: Producer<T> + 'static,
  {
    let producer = Arc::new(producer);
    Self {
      source: Arc::new(move |config: &StreamConfig| open(producer.clone(), config.buffer)),
      stages: Vec::new(),
      config: StreamConfig::default(),
    }
  }

  /// Creates a stream whose producer is an async closure over an [`Emitter`].
  ///
  /// The closure is called once per collection.
  pub fn create<F, Fut>(producer: F) -> Self
  where
    F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
  {
    Self::new(FnProducer(producer))
  }

  /// Replaces the stream configuration.
  pub fn with_config(mut self, config: StreamConfig) -> Self {
    self.config = config;
    self
  }

  /// Sets the name used in logs.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.config.name = Some(name.into());
    self
  }

  fn chain<U>(
    self,
    stage: &'static str,
    wrap: impl Fn(BoxStream<'static, Result<T, StreamError>>) -> BoxStream<'static, Result<U, StreamError>>
    + Send
    + Sync
    + 'static,
  ) -> LazyStream<U> {
    let source = self.source;
    let mut stages = self.stages;
    stages.push(stage);
    LazyStream {
      source: Arc::new(move |config: &StreamConfig| wrap(source(config))),
      stages,
      config: self.config,
    }
  }

  /// Transforms each value with `f`.
  pub fn map<U, F>(self, f: F) -> LazyStream<U>
  where
    U: Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.chain("map", move |upstream| {
      let f = f.clone();
      upstream.map(move |item| item.map(|value| f(value))).boxed()
    })
  }

  /// Transforms each value with a fallible `f`; an `Err` aborts the collection.
  pub fn try_map<U, F>(self, f: F) -> LazyStream<U>
  where
    U: Send + 'static,
    F: Fn(T) -> Result<U, StreamError> + Send + Sync + 'static,
  {
    let f = Arc::new(f);
    self.chain("try_map", move |upstream| {
      let f = f.clone();
      upstream.map(move |item| item.and_then(|value| f(value))).boxed()
    })
  }

  /// Keeps only the values for which `predicate` holds.
  pub fn filter<F>(self, predicate: F) -> LazyStream<T>
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    let predicate = Arc::new(predicate);
    self.chain("filter", move |upstream| {
      let predicate = predicate.clone();
      upstream
        .filter(move |item| {
          let keep = match item {
            Ok(value) => predicate(value),
            Err(_) => true,
          };
          futures::future::ready(keep)
        })
        .boxed()
    })
  }

  /// Runs the pipeline to completion, handing every surviving value to `consumer`.
  ///
  /// Each call re-runs the producer from scratch. Returns the first error
  /// raised by the producer or a stage.
  pub async fn collect<C>(&self, mut consumer: C) -> Result<(), StreamError>
  where
    C: FnMut(T),
  {
    let name = self.name();
    debug!(stream = %name, stages = ?self.stages, "collecting stream");
    let mut values = (self.source)(&self.config);
    let mut forwarded = 0usize;
    while let Some(item) = values.next().await {
      match item {
        Ok(value) => {
          forwarded += 1;
          trace!(stream = %name, index = forwarded - 1, "forwarding value");
          consumer(value);
        }
        Err(e) => {
          warn!(stream = %name, forwarded, error = %e, "stream aborted");
          return Err(e);
        }
      }
    }
    debug!(stream = %name, forwarded, "stream completed");
    Ok(())
  }

  /// Collects every surviving value into a vector.
  pub async fn to_vec(&self) -> Result<Vec<T>, StreamError> {
    let mut out = Vec::new();
    self.collect(|value| out.push(value)).await?;
    Ok(out)
  }

  /// Collects the stream and returns how many values survived the stages.
  pub async fn count(&self) -> Result<usize, StreamError> {
    let mut n = 0usize;
    self.collect(|_| n += 1).await?;
    Ok(n)
  }
}
