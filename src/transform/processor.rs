use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::StageState;
use crate::{
  error::{Failure, FlowError},
  executor::SharedExecutor,
  publisher::{BufferedPublisher, Publisher},
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::Subscription,
};

type TransformFn<T, R> = dyn Fn(T) -> Result<R, Failure> + Send + Sync;

/// Subscriber of `T` and publisher of `R` in one node.
///
/// The processor subscribes to exactly one upstream publisher and pulls one
/// item at a time from it. Every upstream item maps to exactly one output;
/// use a [`TransformPublisher`](super::TransformPublisher) to filter. Each
/// transformed item is submitted to an internal
/// [`BufferedPublisher`], which multicasts it to every downstream subscriber.
/// Submitting blocks while a downstream buffer is full, and the next upstream
/// item is only requested afterwards, so a slow downstream slows the upstream.
///
/// Handles are cheap to clone; subscribe one clone upstream and keep another
/// to subscribe downstream subscribers.
///
/// ```rust
/// use std::sync::Arc;
///
/// use rxflow::prelude::*;
///
/// let upstream = BufferedPublisher::same_thread();
/// let processor = TransformProcessor::with_executor(
///   |v: i32| Ok(v.to_string()),
///   Arc::new(SameThreadExecutor),
///   4,
/// );
/// let collector = FixedCollectorSubscriber::new(Vec::new(), 1);
/// let future = collector.future();
/// processor.subscribe(collector).unwrap();
/// upstream.subscribe(processor.clone()).unwrap();
///
/// upstream.submit(1234).unwrap();
/// assert_eq!(futures::executor::block_on(future).unwrap(), vec!["1234"]);
/// ```
pub struct TransformProcessor<T, R: Send + 'static> {
  inner: Arc<Inner<T, R>>,
}

struct Inner<T, R: Send + 'static> {
  transform: Box<TransformFn<T, R>>,
  publisher: BufferedPublisher<R>,
  upstream: Mutex<Upstream>,
}

struct Upstream {
  state: StageState,
  subscription: Option<Subscription>,
}

impl<T, R: Send + 'static> TransformProcessor<T, R> {
  /// Processor delivering downstream on the shared default pool.
  pub fn new<F>(transform: F) -> Self
  where
    F: Fn(T) -> Result<R, Failure> + Send + Sync + 'static,
  {
    Self::from_parts(Box::new(transform), BufferedPublisher::new())
  }

  /// Processor delivering downstream on `executor`, with the given buffer
  /// capacity per downstream subscriber.
  pub fn with_executor<F>(transform: F, executor: SharedExecutor, max_buffer_capacity: usize) -> Self
  where
    F: Fn(T) -> Result<R, Failure> + Send + Sync + 'static,
  {
    Self::from_parts(
      Box::new(transform),
      BufferedPublisher::with_executor(executor, max_buffer_capacity),
    )
  }

  fn from_parts(transform: Box<TransformFn<T, R>>, publisher: BufferedPublisher<R>) -> Self {
    TransformProcessor {
      inner: Arc::new(Inner {
        transform,
        publisher,
        upstream: Mutex::new(Upstream { state: StageState::Created, subscription: None }),
      }),
    }
  }

  pub fn state(&self) -> StageState { self.inner.upstream.lock().state }

  /// Number of downstream subscribers.
  pub fn subscriber_count(&self) -> usize { self.inner.publisher.subscriber_count() }

  /// Whether the downstream side is closed.
  pub fn is_closed(&self) -> bool { self.inner.publisher.is_closed() }

  /// Cancels the upstream subscription and completes the downstream
  /// subscribers.
  pub fn cancel(&self) {
    let subscription = {
      let mut upstream = self.inner.upstream.lock();
      if upstream.state.is_terminal() {
        return;
      }
      upstream.state = StageState::Completed;
      upstream.subscription.take()
    };
    if let Some(subscription) = subscription {
      subscription.cancel();
    }
    self.inner.publisher.close();
  }

  fn upstream(&self) -> Option<Subscription> {
    let upstream = self.inner.upstream.lock();
    if upstream.state.is_subscribed() {
      upstream.subscription.clone()
    } else {
      None
    }
  }

  /// Moves to a terminal state and hands back the upstream subscription.
  /// `None` if the processor already was terminal.
  fn finish(&self, state: StageState) -> Option<Option<Subscription>> {
    let mut upstream = self.inner.upstream.lock();
    if upstream.state.is_terminal() {
      return None;
    }
    upstream.state = state;
    Some(upstream.subscription.take())
  }
}

impl<T, R: Clone + Send + 'static> Subscriber<T> for TransformProcessor<T, R> {
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    {
      let mut upstream = self.inner.upstream.lock();
      if upstream.state != StageState::Created {
        return Err(FlowError::AlreadySubscribed);
      }
      upstream.state = StageState::Subscribed;
      upstream.subscription = Some(subscription.clone());
    }
    debug!("transform processor subscribed upstream");
    subscription.request(1)
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    let Some(subscription) = self.upstream() else {
      return Ok(());
    };
    {
      let mut upstream = self.inner.upstream.lock();
      if upstream.state == StageState::Subscribed {
        upstream.state = StageState::Streaming;
      }
    }
    match (self.inner.transform)(item) {
      Ok(value) => {
        if self.inner.publisher.submit(value).is_err() {
          trace!("downstream closed, cancelling upstream");
          self.cancel();
          return Ok(());
        }
      }
      Err(failure) => {
        debug!(%failure, "transform failed, cancelling upstream");
        if let Some(Some(subscription)) = self.finish(StageState::Errored) {
          subscription.cancel();
        }
        self.inner.publisher.close_exceptionally(failure);
        return Ok(());
      }
    }
    subscription.request(1)?;
    Ok(())
  }

  fn on_error(&mut self, failure: Failure) {
    if self.finish(StageState::Errored).is_some() {
      self.inner.publisher.close_exceptionally(failure);
    }
  }

  fn on_complete(&mut self) {
    if self.finish(StageState::Completed).is_some() {
      self.inner.publisher.close();
    }
  }
}

impl<T, R: Send + 'static> Publisher<R> for TransformProcessor<T, R> {
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<R>) -> Result<(), FlowError> {
    self.inner.publisher.subscribe_boxed(subscriber)
  }
}

impl<T, R: Send + 'static> Clone for TransformProcessor<T, R> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T, R: Send + 'static> Debug for TransformProcessor<T, R> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransformProcessor")
      .field("state", &self.state())
      .field("downstream", &self.inner.publisher)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use futures::executor::{block_on, ThreadPool};

  use super::*;
  use crate::{
    collector::FixedCollectorSubscriber,
    executor::SameThreadExecutor,
    publisher::SynchronousPublisher,
    test_support::{wait_until, Event, Recorder},
  };

  fn inline<T, R: Send + 'static>(
    f: impl Fn(T) -> Result<R, Failure> + Send + Sync + 'static,
  ) -> TransformProcessor<T, R> {
    TransformProcessor::with_executor(f, Arc::new(SameThreadExecutor), 16)
  }

  #[test]
  fn transforms_on_executor() {
    let processor = TransformProcessor::new(|v: i32| Ok(v.to_string()));
    let upstream = BufferedPublisher::with_executor(
      Arc::new(ThreadPool::builder().pool_size(1).create().unwrap()),
      10,
    );
    let collector = FixedCollectorSubscriber::new(Vec::new(), 1);
    let future = collector.future();
    processor.subscribe(collector).unwrap();
    upstream.subscribe(processor.clone()).unwrap();

    upstream.submit(1234).unwrap();
    assert_eq!(block_on(future).unwrap(), vec!["1234"]);
  }

  #[test]
  fn multicasts_to_all_downstream_subscribers() {
    let processor = inline(|v: i32| Ok(v * 10));
    let a = Recorder::new(10);
    let b = Recorder::new(10);
    processor.subscribe(a.clone()).unwrap();
    processor.subscribe(b.clone()).unwrap();
    assert_eq!(processor.subscriber_count(), 2);

    let upstream = SynchronousPublisher::new();
    upstream.subscribe(processor.clone()).unwrap();
    assert_eq!(processor.state(), StageState::Subscribed);
    upstream.submit(1).unwrap();
    upstream.submit(2).unwrap();
    upstream.close();

    assert_eq!(a.events(), vec![Event::Next(10), Event::Next(20), Event::Complete]);
    assert_eq!(b.events(), a.events());
    assert_eq!(processor.state(), StageState::Completed);
  }

  #[test]
  fn pulls_one_item_per_output() {
    let processor = inline(|v: i32| Ok(v + 1));
    let recorder = Recorder::new(10);
    processor.subscribe(recorder.clone()).unwrap();
    let upstream = BufferedPublisher::same_thread();
    upstream.subscribe(processor.clone()).unwrap();
    assert_eq!(upstream.estimate_minimum_demand(), 1);
    for i in 0..6 {
      upstream.submit(i).unwrap();
      assert_eq!(upstream.estimate_minimum_demand(), 1);
    }
    assert_eq!(recorder.items(), vec![1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn transform_error_closes_downstream_and_cancels_upstream() {
    let processor = inline(|v: i32| {
      if v == 2 {
        Err(Failure::msg("bad item"))
      } else {
        Ok(v)
      }
    });
    let recorder = Recorder::new(10);
    processor.subscribe(recorder.clone()).unwrap();
    let upstream = BufferedPublisher::same_thread();
    upstream.subscribe(processor.clone()).unwrap();

    upstream.submit(1).unwrap();
    upstream.submit(2).unwrap();
    assert_eq!(upstream.submit(3), Ok(0));
    assert_eq!(recorder.events(), vec![Event::Next(1), Event::Error("bad item".to_owned())]);
    assert_eq!(processor.state(), StageState::Errored);
    assert!(processor.is_closed());
  }

  #[test]
  fn upstream_error_is_forwarded_once() {
    let processor = inline(|v: i32| Ok(v));
    let recorder = Recorder::new(10);
    processor.subscribe(recorder.clone()).unwrap();
    let upstream = SynchronousPublisher::new();
    upstream.subscribe(processor.clone()).unwrap();
    upstream.close_exceptionally(Failure::msg("upstream"));

    let mut handle = processor.clone();
    handle.on_complete();
    assert_eq!(recorder.events(), vec![Event::Error("upstream".to_owned())]);
  }

  #[test]
  fn second_upstream_is_rejected() {
    let processor = inline(|v: i32| Ok(v));
    SynchronousPublisher::new()
      .subscribe(processor.clone())
      .unwrap();
    assert_eq!(
      SynchronousPublisher::new().subscribe(processor.clone()),
      Err(FlowError::AlreadySubscribed)
    );
  }

  #[test]
  fn cancel_stops_upstream() {
    let processor = inline(|v: i32| Ok(v));
    let recorder = Recorder::new(10);
    processor.subscribe(recorder.clone()).unwrap();
    let upstream = BufferedPublisher::same_thread();
    upstream.subscribe(processor.clone()).unwrap();
    upstream.submit(1).unwrap();

    processor.cancel();
    assert_eq!(upstream.subscriber_count(), 0);
    assert!(wait_until(Duration::from_secs(1), || recorder.is_terminated()));
    assert_eq!(recorder.events(), vec![Event::Next(1), Event::Complete]);
  }
}
