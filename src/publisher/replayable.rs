use std::{
  fmt::{Debug, Formatter},
  hash::Hash,
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{BufferedPublisher, Publisher};
use crate::{
  cache::BoundedDedupCache,
  error::{Failure, FlowError},
  executor::SharedExecutor,
  subscriber::{BoxedSubscriber, ReplayableSubscriber, Subscriber},
  subscription::Subscription,
};

/// Buffered publisher that remembers the last `cache_size` distinct items and
/// hands them to late subscribers.
///
/// Subscribers registered through
/// [`subscribe_replayable`](ReplayablePublisher::subscribe_replayable) first
/// receive every cached item, oldest first, through
/// [`ReplayableSubscriber::replay`], and are subscribed afterwards. Plain
/// subscribers registered through [`Publisher::subscribe`] only see live
/// items.
///
/// An item equal to one still in the cache is a duplicate: it is neither
/// cached again nor delivered to anybody.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let publisher = ReplayablePublisher::new(2);
/// for i in [1, 2, 2, 3] {
///   publisher.submit(i).unwrap();
/// }
/// assert_eq!(publisher.cache_snapshot(), vec![2, 3]);
///
/// let collector = CollectorSubscriber::new(Vec::new());
/// let future = collector.future();
/// publisher.subscribe_replayable(collector).unwrap();
/// publisher.submit(4).unwrap();
/// publisher.close();
/// assert_eq!(futures::executor::block_on(future).unwrap(), vec![2, 3, 4]);
/// ```
pub struct ReplayablePublisher<T: Send + 'static> {
  /// Also orders cache updates against registrations: a cached item is either
  /// in a new subscriber's backlog or offered to it live, never both.
  cache: Mutex<BoundedDedupCache<T>>,
  publisher: BufferedPublisher<T>,
}

impl<T> ReplayablePublisher<T>
where
  T: Eq + Hash + Clone + Send + 'static,
{
  /// Publisher on the shared default pool caching `cache_size` items.
  pub fn new(cache_size: usize) -> Self { Self::wrap(cache_size, BufferedPublisher::new()) }

  /// Publisher delivering on `executor` with the given per-subscriber buffer
  /// capacity.
  pub fn with_executor(
    cache_size: usize, executor: SharedExecutor, max_buffer_capacity: usize,
  ) -> Self {
    Self::wrap(cache_size, BufferedPublisher::with_executor(executor, max_buffer_capacity))
  }

  fn wrap(cache_size: usize, publisher: BufferedPublisher<T>) -> Self {
    ReplayablePublisher { cache: Mutex::new(BoundedDedupCache::new(cache_size)), publisher }
  }

  /// Caches `item` and forwards it to the subscribers.
  ///
  /// Duplicates of a cached item are dropped and `Ok(())` is returned.
  /// Fails with [`FlowError::AlreadyClosed`] once closed.
  pub fn submit(&self, item: T) -> Result<(), FlowError> {
    if self.publisher.is_closed() {
      return Err(FlowError::AlreadyClosed);
    }
    let targets = {
      let mut cache = self.cache.lock();
      if !cache.add(item.clone()) {
        trace!("duplicate item dropped");
        return Ok(());
      }
      self.publisher.targets()
    };
    self.publisher.offer(&targets, item);
    Ok(())
  }

  /// Replays the cached items to `subscriber`, then subscribes it.
  ///
  /// Replay stops at the first error `replay` returns, and the subscriber is
  /// not subscribed. Items submitted while the backlog is replayed are
  /// delivered after it.
  pub fn subscribe_replayable<S>(&self, subscriber: S) -> Result<(), FlowError>
  where
    S: ReplayableSubscriber<T> + Send + 'static,
  {
    let pending = {
      let cache = self.cache.lock();
      let backlog = cache.to_vec();
      self.publisher.register(Box::new(Replayed { subscriber, backlog }))?
    };
    self.publisher.start(pending)
  }

  pub fn cache_len(&self) -> usize { self.cache.lock().len() }

  pub fn is_cache_empty(&self) -> bool { self.cache.lock().is_empty() }

  pub fn cache_contains(&self, item: &T) -> bool { self.cache.lock().contains(item) }

  /// Copy of the cached items, oldest first.
  pub fn cache_snapshot(&self) -> Vec<T> { self.cache.lock().to_vec() }

  pub fn clear_cache(&self) { self.cache.lock().clear(); }

  pub fn cache_capacity(&self) -> usize { self.cache.lock().capacity() }
}

impl<T: Send + 'static> ReplayablePublisher<T> {
  pub fn subscriber_count(&self) -> usize { self.publisher.subscriber_count() }

  /// Whether `subscription` belongs to a live subscriber of this publisher.
  pub fn is_subscribed(&self, subscription: &Subscription) -> bool {
    self.publisher.is_subscribed(subscription)
  }

  pub fn is_closed(&self) -> bool { self.publisher.is_closed() }

  /// Completes every subscriber once its buffered items are delivered. The
  /// cache stays readable.
  pub fn close(&self) { self.publisher.close(); }

  pub fn close_exceptionally(&self, failure: Failure) { self.publisher.close_exceptionally(failure); }
}

impl<T> Publisher<T> for ReplayablePublisher<T>
where
  T: Eq + Hash + Clone + Send + 'static,
{
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<T>) -> Result<(), FlowError> {
    self.publisher.subscribe_boxed(subscriber)
  }
}

impl<T> Debug for ReplayablePublisher<T>
where
  T: Debug + Send + 'static,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReplayablePublisher")
      .field("cache", &*self.cache.lock())
      .field("publisher", &self.publisher)
      .finish()
  }
}

/// Hands the backlog to `replay` right before `on_subscribe`, outside of any
/// publisher lock.
struct Replayed<S, T> {
  subscriber: S,
  backlog: Vec<T>,
}

impl<S, T> Subscriber<T> for Replayed<S, T>
where
  S: ReplayableSubscriber<T>,
{
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    let backlog = std::mem::take(&mut self.backlog);
    debug!(replayed = backlog.len(), "replaying cached items");
    for item in backlog {
      self.subscriber.replay(item)?;
    }
    self.subscriber.on_subscribe(subscription)
  }

  #[inline]
  fn on_next(&mut self, item: T) -> Result<(), Failure> { self.subscriber.on_next(item) }

  #[inline]
  fn on_error(&mut self, failure: Failure) { self.subscriber.on_error(failure) }

  #[inline]
  fn on_complete(&mut self) { self.subscriber.on_complete() }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use futures::executor::ThreadPool;

  use super::*;
  use crate::{
    executor::SameThreadExecutor,
    subscriber::FnSubscriber,
    test_support::{wait_until, Event, Recorder},
  };

  fn inline(cache_size: usize) -> ReplayablePublisher<i32> {
    ReplayablePublisher::with_executor(cache_size, Arc::new(SameThreadExecutor), 16)
  }

  #[test]
  fn replays_before_live_items() {
    let publisher = inline(3);
    for i in 1..=4 {
      publisher.submit(i).unwrap();
    }
    let recorder = Recorder::new(10);
    publisher.subscribe_replayable(recorder.clone()).unwrap();
    publisher.submit(5).unwrap();
    assert_eq!(
      recorder.events(),
      vec![Event::Replay(2), Event::Replay(3), Event::Replay(4), Event::Next(5)]
    );
  }

  #[test]
  fn plain_subscribers_skip_replay() {
    let publisher = inline(3);
    publisher.submit(1).unwrap();
    let recorder = Recorder::new(10);
    publisher.subscribe(recorder.clone()).unwrap();
    publisher.submit(2).unwrap();
    assert_eq!(recorder.events(), vec![Event::Next(2)]);
  }

  #[test]
  fn duplicates_are_not_forwarded() {
    let publisher = inline(3);
    let recorder = Recorder::new(10);
    publisher.subscribe(recorder.clone()).unwrap();
    for i in [1, 1, 2, 1, 3] {
      publisher.submit(i).unwrap();
    }
    assert_eq!(recorder.items(), vec![1, 2, 3]);
    assert_eq!(publisher.cache_snapshot(), vec![1, 2, 3]);

    // 1 was evicted, so it is new again.
    publisher.submit(4).unwrap();
    publisher.submit(1).unwrap();
    assert_eq!(recorder.items(), vec![1, 2, 3, 4, 1]);
  }

  #[test]
  fn zero_cache_forwards_everything() {
    let publisher = inline(0);
    let recorder = Recorder::new(10);
    publisher.subscribe_replayable(recorder.clone()).unwrap();
    publisher.submit(1).unwrap();
    publisher.submit(1).unwrap();
    assert_eq!(recorder.items(), vec![1, 1]);
    assert!(publisher.is_cache_empty());
  }

  #[test]
  fn cache_outlives_close() {
    let publisher = inline(2);
    publisher.submit(1).unwrap();
    publisher.submit(2).unwrap();
    publisher.close();
    assert!(publisher.is_closed());
    assert_eq!(publisher.submit(3), Err(FlowError::AlreadyClosed));
    assert_eq!(
      publisher.subscribe_replayable(Recorder::new(1)),
      Err(FlowError::AlreadyClosed)
    );
    assert_eq!(publisher.cache_len(), 2);
    assert!(publisher.cache_contains(&1));
    publisher.clear_cache();
    assert!(publisher.is_cache_empty());
    assert_eq!(publisher.cache_capacity(), 2);
  }

  #[test]
  fn close_exceptionally_reaches_subscribers() {
    let publisher = inline(2);
    let recorder = Recorder::new(1);
    publisher.subscribe_replayable(recorder.clone()).unwrap();
    assert_eq!(publisher.subscriber_count(), 1);
    publisher.close_exceptionally(Failure::msg("gone"));
    assert_eq!(recorder.events(), vec![Event::Error("gone".to_owned())]);
  }

  #[test]
  fn subscribe_replayable_from_on_next() {
    let publisher = Arc::new(inline(4));
    let late = Recorder::new(10);
    let pending = Mutex::new(Some(late.clone()));
    let c_publisher = publisher.clone();
    let first = FnSubscriber::new(move |_: i32| {
      if let Some(late) = pending.lock().take() {
        c_publisher.subscribe_replayable(late).unwrap();
      }
    })
    .keep_requesting();
    publisher.subscribe(first).unwrap();

    publisher.submit(1).unwrap();
    publisher.submit(2).unwrap();
    assert_eq!(late.events(), vec![Event::Replay(1), Event::Next(2)]);
    assert_eq!(publisher.subscriber_count(), 2);
  }

  #[test]
  fn blocked_submit_does_not_hold_up_subscribers() {
    let executor = Arc::new(ThreadPool::builder().pool_size(2).create().unwrap());
    let publisher = Arc::new(ReplayablePublisher::with_executor(4, executor, 1));
    let slow = Recorder::new(0);
    publisher.subscribe(slow.clone()).unwrap();
    publisher.submit(1).unwrap();

    let producer = publisher.clone();
    let blocked = thread::spawn(move || producer.submit(2));
    assert!(wait_until(Duration::from_secs(5), || publisher.cache_len() == 2));
    thread::sleep(Duration::from_millis(20));
    assert!(!blocked.is_finished());

    let (tx, rx) = std::sync::mpsc::channel();
    let subscriber = publisher.clone();
    let late = Recorder::new(10);
    let c_late = late.clone();
    thread::spawn(move || {
      let _ = tx.send(subscriber.subscribe_replayable(c_late));
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(3)), Ok(Ok(())));
    assert!(wait_until(Duration::from_secs(5), || late.events().len() == 2));
    assert_eq!(late.events(), vec![Event::Replay(1), Event::Replay(2)]);

    slow.subscription().request(2).unwrap();
    assert_eq!(blocked.join().unwrap(), Ok(()));
    assert!(wait_until(Duration::from_secs(5), || slow.items() == vec![1, 2]));
  }

  #[test]
  fn membership_follows_the_subscription() {
    let publisher = inline(2);
    let recorder = Recorder::new(1);
    publisher.subscribe_replayable(recorder.clone()).unwrap();
    let subscription = recorder.subscription().get().unwrap();
    assert!(publisher.is_subscribed(&subscription));

    let other = inline(2);
    assert!(!other.is_subscribed(&subscription));

    subscription.cancel();
    assert!(!publisher.is_subscribed(&subscription));
  }

  #[test]
  fn failing_replay_does_not_subscribe() {
    struct Refusing;

    impl Subscriber<i32> for Refusing {
      fn on_subscribe(&mut self, _: Subscription) -> Result<(), FlowError> { Ok(()) }

      fn on_next(&mut self, _: i32) -> Result<(), Failure> { Ok(()) }

      fn on_error(&mut self, _: Failure) {}

      fn on_complete(&mut self) {}
    }

    impl ReplayableSubscriber<i32> for Refusing {
      fn replay(&mut self, _: i32) -> Result<(), FlowError> { Err(FlowError::ReplayAfterSubscribe) }
    }

    let publisher = inline(2);
    publisher.submit(1).unwrap();
    assert_eq!(publisher.subscribe_replayable(Refusing), Err(FlowError::ReplayAfterSubscribe));
    assert_eq!(publisher.subscriber_count(), 0);
  }
}
