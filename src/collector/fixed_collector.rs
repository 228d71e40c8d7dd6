use std::{
  fmt::{Debug, Formatter},
  marker::PhantomData,
  sync::{Arc, Weak},
  thread::{self, Thread},
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{CollectFuture, Completion};
use crate::{
  error::{Failure, FlowError},
  subscriber::{ReplayableSubscriber, Subscriber},
  subscription::Subscription,
};

type MessageConsumer<T> = Box<dyn FnMut(&T) + Send>;

/// Subscriber collecting exactly `max_size` items.
///
/// It requests one item at a time. When the `max_size`-th item arrives the
/// future resolves with the container and the subscription is cancelled, so
/// no further item is ever requested. If the publisher completes earlier, the
/// future resolves with whatever was collected; if it fails earlier, the
/// future fails.
///
/// Replayed items count towards `max_size`. A collector that is already full
/// when it gets subscribed cancels its subscription right away.
///
/// [`with_timeout`](FixedCollectorSubscriber::with_timeout) bounds how long
/// the collector waits: at the deadline the future resolves with the items
/// collected so far.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let publisher = ReplayablePublisher::new(10);
/// for i in 0..4 {
///   publisher.submit(i).unwrap();
/// }
/// let collector = FixedCollectorSubscriber::new(Vec::new(), 3);
/// publisher.subscribe_replayable(collector.clone()).unwrap();
/// assert_eq!(collector.future().wait().unwrap(), vec![0, 1, 2]);
/// ```
pub struct FixedCollectorSubscriber<T, C> {
  state: Arc<Mutex<State<T, C>>>,
  max_size: usize,
  _item: PhantomData<fn(T)>,
}

struct State<T, C> {
  items: C,
  len: usize,
  subscription: Option<Subscription>,
  completion: Completion<C>,
  consumer: Option<MessageConsumer<T>>,
  /// Timeout thread to wake once the future resolved.
  watchdog: Option<Thread>,
}

impl<T, C: Clone> State<T, C> {
  fn finish(&mut self, outcome: Result<C, Failure>) {
    self.completion.complete(outcome);
    if let Some(watchdog) = self.watchdog.take() {
      watchdog.unpark();
    }
  }

  /// Nothing more is accepted once full or resolved.
  fn is_closed(&self, max_size: usize) -> bool { self.len >= max_size || self.completion.is_done() }
}

impl<T, C> FixedCollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  pub fn new(container: C, max_size: usize) -> Self {
    let mut completion = Completion::new();
    if max_size == 0 {
      completion.complete(Ok(container.clone()));
    }
    FixedCollectorSubscriber {
      state: Arc::new(Mutex::new(State {
        items: container,
        len: 0,
        subscription: None,
        completion,
        consumer: None,
        watchdog: None,
      })),
      max_size,
      _item: PhantomData,
    }
  }

  /// Calls `consumer` with every item received from the publisher, before it
  /// is stored. The consumer must not call back into this collector.
  pub fn with_message_consumer(self, consumer: impl FnMut(&T) + Send + 'static) -> Self {
    self.state.lock().consumer = Some(Box::new(consumer));
    self
  }

  /// Resolves the future with the items collected so far once `timeout`
  /// elapsed, and cancels the subscription. Has no effect if the collector is
  /// done before the deadline.
  pub fn with_timeout(self, timeout: Duration) -> Self
  where
    T: 'static,
    C: Send + 'static,
  {
    let deadline = Instant::now() + timeout;
    let state = Arc::downgrade(&self.state);
    let spawned = thread::Builder::new()
      .name("rxflow-collector-timeout".to_owned())
      .spawn(move || expire_at(state, deadline));
    match spawned {
      Ok(handle) => self.state.lock().watchdog = Some(handle.thread().clone()),
      Err(err) => warn!(%err, "collector timeout thread failed to start"),
    }
    self
  }

  pub fn future(&self) -> CollectFuture<C> { self.state.lock().completion.future() }

  /// Runs `f` on the collected items.
  pub fn with_items<U>(&self, f: impl FnOnce(&C) -> U) -> U { f(&self.state.lock().items) }

  /// Copy of the collected items.
  pub fn snapshot(&self) -> C { self.state.lock().items.clone() }

  pub fn is_done(&self) -> bool { self.state.lock().completion.is_done() }

  /// Stores `item`, resolving the future once full. Returns whether the
  /// collector is full.
  fn store(&self, state: &mut State<T, C>, item: T) -> bool {
    state.items.extend(Some(item));
    state.len += 1;
    if state.len < self.max_size {
      return false;
    }
    debug!(max_size = self.max_size, "fixed collector full");
    let items = state.items.clone();
    state.finish(Ok(items));
    true
  }
}

/// Sleeps until `deadline`, then resolves the collector with what it has.
/// Returns early once the collector resolved or was dropped.
fn expire_at<T, C: Clone>(state: Weak<Mutex<State<T, C>>>, deadline: Instant) {
  loop {
    let now = Instant::now();
    if now >= deadline {
      break;
    }
    thread::park_timeout(deadline - now);
    match state.upgrade() {
      Some(state) if !state.lock().completion.is_done() => {}
      _ => return,
    }
  }
  let Some(state) = state.upgrade() else { return };
  let subscription = {
    let mut state = state.lock();
    if state.completion.is_done() {
      return;
    }
    debug!(len = state.len, "fixed collector timed out");
    let items = state.items.clone();
    state.finish(Ok(items));
    state.subscription.clone()
  };
  if let Some(subscription) = subscription {
    subscription.cancel();
  }
}

impl<T, C> FixedCollectorSubscriber<T, C> {
  #[inline]
  pub fn max_size(&self) -> usize { self.max_size }

  pub fn subscription(&self) -> Option<Subscription> { self.state.lock().subscription.clone() }

  pub fn is_subscribed(&self) -> bool { self.state.lock().subscription.is_some() }

  /// Number of items collected, replayed ones included.
  pub fn len(&self) -> usize { self.state.lock().len }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<T, C> Subscriber<T> for FixedCollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    let full = {
      let mut state = self.state.lock();
      if state.subscription.is_some() {
        return Err(FlowError::AlreadySubscribed);
      }
      state.subscription = Some(subscription.clone());
      state.is_closed(self.max_size)
    };
    if full {
      subscription.cancel();
      Ok(())
    } else {
      subscription.request(1)
    }
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    let (subscription, full) = {
      let mut state = self.state.lock();
      if state.is_closed(self.max_size) {
        return Ok(());
      }
      if let Some(consumer) = state.consumer.as_mut() {
        consumer(&item);
      }
      let full = self.store(&mut state, item);
      (state.subscription.clone(), full)
    };
    match subscription {
      Some(subscription) if full => subscription.cancel(),
      Some(subscription) => subscription.request(1)?,
      None => {}
    }
    Ok(())
  }

  fn on_error(&mut self, failure: Failure) {
    debug!(%failure, "fixed collector failed");
    self.state.lock().finish(Err(failure));
  }

  fn on_complete(&mut self) {
    let mut state = self.state.lock();
    let items = state.items.clone();
    state.finish(Ok(items));
  }
}

impl<T, C> ReplayableSubscriber<T> for FixedCollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  fn replay(&mut self, item: T) -> Result<(), FlowError> {
    let mut state = self.state.lock();
    if state.subscription.is_some() {
      return Err(FlowError::ReplayAfterSubscribe);
    }
    if !state.is_closed(self.max_size) {
      self.store(&mut state, item);
    }
    Ok(())
  }
}

impl<T, C> Clone for FixedCollectorSubscriber<T, C> {
  fn clone(&self) -> Self {
    FixedCollectorSubscriber {
      state: self.state.clone(),
      max_size: self.max_size,
      _item: PhantomData,
    }
  }
}

impl<T, C: Debug> Debug for FixedCollectorSubscriber<T, C> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("FixedCollectorSubscriber")
      .field("items", &state.items)
      .field("max_size", &self.max_size)
      .field("subscribed", &state.subscription.is_some())
      .field("done", &state.completion.is_done())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    publisher::{BufferedPublisher, Publisher, SynchronousPublisher},
    test_support::wait_until,
  };

  #[test]
  fn stops_at_max_size() {
    let publisher = BufferedPublisher::same_thread();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 2);
    publisher.subscribe(collector.clone()).unwrap();
    for i in 0..5 {
      publisher.submit(i).unwrap();
    }
    assert_eq!(collector.future().wait().unwrap(), vec![0, 1]);
    assert!(collector.subscription().unwrap().is_cancelled());
    assert_eq!(publisher.subscriber_count(), 0);
    assert_eq!(collector.len(), 2);
  }

  #[test]
  fn early_completion_keeps_partial_result() {
    let publisher = SynchronousPublisher::new();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 10);
    publisher.subscribe(collector.clone()).unwrap();
    publisher.submit("a").unwrap();
    publisher.close();
    assert_eq!(collector.future().wait().unwrap(), vec!["a"]);
  }

  #[test]
  fn early_error_fails() {
    let publisher = SynchronousPublisher::<i32>::new();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 10);
    publisher.subscribe(collector.clone()).unwrap();
    publisher.close_exceptionally(Failure::msg("gone"));
    assert_eq!(collector.future().wait().unwrap_err().to_string(), "gone");
  }

  #[test]
  fn replay_fills_up_to_max_size() {
    let mut collector = FixedCollectorSubscriber::new(Vec::new(), 2);
    collector.replay(1).unwrap();
    collector.replay(2).unwrap();
    collector.replay(3).unwrap();
    assert_eq!(collector.snapshot(), vec![1, 2]);
    assert!(collector.is_done());

    let publisher = SynchronousPublisher::new();
    publisher.subscribe(collector.clone()).unwrap();
    assert!(collector.subscription().unwrap().is_cancelled());
    assert_eq!(publisher.subscriber_count(), 0);
    assert_eq!(collector.replay(4), Err(FlowError::ReplayAfterSubscribe));
  }

  #[test]
  fn message_consumer_sees_live_items() {
    let seen = Arc::new(Mutex::new(vec![]));
    let c_seen = seen.clone();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 3)
      .with_message_consumer(move |v: &i32| c_seen.lock().push(*v));
    let publisher = BufferedPublisher::same_thread();
    publisher.subscribe(collector.clone()).unwrap();
    for i in 10..13 {
      publisher.submit(i).unwrap();
    }
    assert_eq!(*seen.lock(), vec![10, 11, 12]);
    assert_eq!(collector.future().wait().unwrap(), vec![10, 11, 12]);
  }

  #[test]
  fn timeout_resolves_with_partial_items() {
    let publisher = BufferedPublisher::same_thread();
    let collector =
      FixedCollectorSubscriber::new(Vec::new(), 5).with_timeout(Duration::from_millis(50));
    publisher.subscribe(collector.clone()).unwrap();
    publisher.submit(1).unwrap();
    publisher.submit(2).unwrap();

    assert_eq!(collector.future().wait().unwrap(), vec![1, 2]);
    let subscription = collector.subscription().unwrap();
    assert!(wait_until(Duration::from_secs(5), || subscription.is_cancelled()));
    assert_eq!(publisher.submit(3), Ok(0));
    assert_eq!(collector.snapshot(), vec![1, 2]);
  }

  #[test]
  fn timeout_without_subscription_resolves_empty() {
    let collector =
      FixedCollectorSubscriber::<i32, _>::new(Vec::new(), 3).with_timeout(Duration::from_millis(10));
    assert!(collector.future().wait().unwrap().is_empty());

    // A collector that timed out refuses its subscription.
    let publisher = SynchronousPublisher::new();
    publisher.subscribe(collector.clone()).unwrap();
    assert!(collector.subscription().unwrap().is_cancelled());
  }

  #[test]
  fn full_before_timeout_keeps_all_items() {
    let publisher = BufferedPublisher::same_thread();
    let collector =
      FixedCollectorSubscriber::new(Vec::new(), 2).with_timeout(Duration::from_secs(30));
    publisher.subscribe(collector.clone()).unwrap();
    publisher.submit(7).unwrap();
    publisher.submit(8).unwrap();
    assert_eq!(collector.future().wait().unwrap(), vec![7, 8]);
  }

  #[test]
  fn zero_size_is_done_immediately() {
    let collector = FixedCollectorSubscriber::<i32, _>::new(Vec::new(), 0);
    assert!(collector.is_done());
    assert!(collector.future().wait().unwrap().is_empty());
  }
}
