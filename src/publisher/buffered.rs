use std::{
  collections::VecDeque,
  fmt::{Debug, Formatter},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
  },
};

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::{Publisher, Terminal};
use crate::{
  error::{Failure, FlowError},
  executor::{default_executor, SameThreadExecutor, SharedExecutor},
  subscriber::BoxedSubscriber,
  subscription::{Demand, Registry, Subscription, SubscriptionLike},
};

/// Per-subscriber buffer capacity used by [`BufferedPublisher::new`].
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Subscriptions an item is offered to.
pub(super) type Targets<T> = SmallVec<[Arc<BufferedSubscription<T>>; 4]>;

/// Asynchronous multicast publisher with a bounded buffer per subscriber.
///
/// [`submit`](BufferedPublisher::submit) appends the item to the buffer of
/// every subscriber and returns; delivery happens in drain tasks run by the
/// publisher's [`Executor`](crate::executor::Executor). At most one drain task
/// runs per subscriber at a time, so each subscriber sees items in submission
/// order and its callbacks never overlap. When a buffer is full, `submit`
/// blocks until that subscriber requests more, cancels, or the publisher is
/// closed.
///
/// Items submitted while nobody is subscribed are dropped. A subscriber is
/// registered before its `on_subscribe` runs, so it receives every item
/// submitted after `subscribe` was called.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let publisher = BufferedPublisher::new();
/// let collector = CollectorSubscriber::new(Vec::new());
/// let future = collector.future();
/// publisher.subscribe(collector).unwrap();
///
/// for i in 0..5 {
///   publisher.submit(i).unwrap();
/// }
/// publisher.close();
/// assert_eq!(futures::executor::block_on(future).unwrap(), vec![0, 1, 2, 3, 4]);
/// ```
pub struct BufferedPublisher<T: Send + 'static> {
  inner: Arc<Inner<T>>,
}

struct Inner<T: Send + 'static> {
  executor: SharedExecutor,
  capacity: usize,
  state: Mutex<State<T>>,
  /// Serializes submitters so every buffer receives items in the same order.
  submission: Mutex<()>,
}

struct State<T> {
  terminal: Option<Terminal>,
  registry: Registry<Arc<BufferedSubscription<T>>>,
}

impl<T: Send + 'static> BufferedPublisher<T> {
  /// Publisher delivering on the shared default pool with a buffer capacity
  /// of [`DEFAULT_BUFFER_CAPACITY`].
  pub fn new() -> Self { Self::with_executor(default_executor(), DEFAULT_BUFFER_CAPACITY) }

  /// Publisher delivering on `executor`. A capacity of zero is raised to one.
  pub fn with_executor(executor: SharedExecutor, max_buffer_capacity: usize) -> Self {
    BufferedPublisher {
      inner: Arc::new(Inner {
        executor,
        capacity: max_buffer_capacity.max(1),
        state: Mutex::new(State { terminal: None, registry: Registry::new() }),
        submission: Mutex::new(()),
      }),
    }
  }

  /// Publisher delivering inline on the thread that submits, requests or
  /// closes, with a buffer capacity of one.
  ///
  /// Subscribers must not submit to the same publisher from their callbacks.
  pub fn same_thread() -> Self { Self::with_executor(Arc::new(SameThreadExecutor), 1) }

  /// Number of registered, non-cancelled subscribers.
  pub fn subscriber_count(&self) -> usize {
    let mut state = self.inner.state.lock();
    state.registry.retain(|s| !s.is_cancelled());
    state.registry.len()
  }

  #[inline]
  pub fn has_subscribers(&self) -> bool { self.subscriber_count() > 0 }

  #[inline]
  pub fn max_buffer_capacity(&self) -> usize { self.inner.capacity }

  pub fn is_closed(&self) -> bool { self.inner.state.lock().terminal.is_some() }

  /// Largest number of items buffered but not yet delivered, over all
  /// subscribers.
  pub fn estimate_maximum_lag(&self) -> usize {
    self
      .targets()
      .iter()
      .map(|s| s.buffered())
      .max()
      .unwrap_or(0)
  }

  /// Smallest outstanding demand over all subscribers, zero without any.
  pub fn estimate_minimum_demand(&self) -> u64 {
    self
      .targets()
      .iter()
      .map(|s| s.demand.get())
      .min()
      .unwrap_or(0)
  }

  /// Delivers the remaining buffered items, then `on_complete`, to every
  /// subscriber. Idempotent; the first of `close` and `close_exceptionally`
  /// wins.
  pub fn close(&self) { self.inner.terminate(Terminal::Complete); }

  /// Discards buffered items and delivers `on_error(failure)` to every
  /// subscriber. Idempotent; the first of `close` and `close_exceptionally`
  /// wins.
  pub fn close_exceptionally(&self, failure: Failure) {
    self.inner.terminate(Terminal::Error(failure));
  }

  /// Whether `subscription` was handed out by this publisher and is still
  /// live.
  pub fn is_subscribed(&self, subscription: &Subscription) -> bool {
    self.targets().iter().any(|s| subscription.controls(s))
  }

  pub(super) fn targets(&self) -> Targets<T> {
    let mut state = self.inner.state.lock();
    state.registry.retain(|s| !s.is_cancelled());
    state.registry.snapshot()
  }

  /// Adds `subscriber` to the registry without subscribing it. Items are
  /// buffered for it right away but nothing is delivered before
  /// [`start`](Self::start).
  pub(super) fn register(
    &self, subscriber: BoxedSubscriber<T>,
  ) -> Result<Arc<BufferedSubscription<T>>, FlowError> {
    let subscription =
      BufferedSubscription::new(subscriber, self.inner.executor.clone(), self.inner.capacity);
    let mut state = self.inner.state.lock();
    if state.terminal.is_some() {
      return Err(FlowError::AlreadyClosed);
    }
    state.registry.retain(|s| !s.is_cancelled());
    state.registry.add(subscription.clone());
    Ok(subscription)
  }

  /// Calls `on_subscribe` on a registered subscriber, then lets its buffered
  /// items and a pending terminal signal through.
  pub(super) fn start(&self, subscription: Arc<BufferedSubscription<T>>) -> Result<(), FlowError> {
    let handle = Subscription::from_arc(subscription.clone());
    let subscribed = subscription.subscriber.lock().on_subscribe(handle);
    if let Err(err) = subscribed {
      subscription.cancel();
      return Err(err);
    }
    debug!(capacity = self.inner.capacity, "subscriber registered with buffered publisher");
    subscription.activate();
    Ok(())
  }
}

impl<T: Clone + Send + 'static> BufferedPublisher<T> {
  /// Buffers `item` for every current subscriber.
  ///
  /// Blocks while a subscriber's buffer is full. Fails with
  /// [`FlowError::AlreadyClosed`] if the publisher is closed on entry. Returns
  /// the number of subscribers the item was buffered for.
  pub fn submit(&self, item: T) -> Result<usize, FlowError> {
    if self.is_closed() {
      return Err(FlowError::AlreadyClosed);
    }
    Ok(self.offer(&self.targets(), item))
  }

  /// Buffers `item` for each of `targets`, in the same order for all
  /// concurrent submitters.
  pub(super) fn offer(&self, targets: &Targets<T>, item: T) -> usize {
    if targets.is_empty() {
      trace!("no subscribers, item dropped");
      return 0;
    }
    let _serial = self.inner.submission.lock();
    let buffered = targets.iter().filter(|t| t.offer(item.clone())).count();
    trace!(buffered, "item submitted");
    buffered
  }
}

impl<T: Send + 'static> Publisher<T> for BufferedPublisher<T> {
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<T>) -> Result<(), FlowError> {
    let subscription = self.register(subscriber)?;
    self.start(subscription)
  }
}

impl<T: Send + 'static> Inner<T> {
  fn terminate(&self, terminal: Terminal) {
    let targets: Vec<_> = {
      let mut state = self.state.lock();
      if state.terminal.is_some() {
        return;
      }
      state.terminal = Some(terminal.clone());
      state.registry.drain().collect()
    };
    debug!(subscribers = targets.len(), ?terminal, "buffered publisher closed");
    for target in targets {
      target.mark_terminal(terminal.clone());
    }
  }
}

impl<T: Send + 'static> Drop for Inner<T> {
  fn drop(&mut self) { self.terminate(Terminal::Complete); }
}

impl<T: Send + 'static> Default for BufferedPublisher<T> {
  fn default() -> Self { Self::new() }
}

impl<T: Send + 'static> Clone for BufferedPublisher<T> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Send + 'static> Debug for BufferedPublisher<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("BufferedPublisher")
      .field("closed", &state.terminal.is_some())
      .field("subscribers", &state.registry.len())
      .field("max_buffer_capacity", &self.inner.capacity)
      .finish()
  }
}

// ============================================================================
// BufferedSubscription
// ============================================================================

/// One subscriber, its buffer, and the drain machinery delivering to it.
///
/// `scheduled` is set while a drain task is queued or running; whoever flips it
/// from `false` to `true` hands a drain to the executor. It starts out `true`
/// so nothing is delivered before `on_subscribe` returned.
pub(super) struct BufferedSubscription<T> {
  this: Weak<BufferedSubscription<T>>,
  demand: Demand,
  cancelled: AtomicBool,
  scheduled: AtomicBool,
  buffer: Mutex<Buffer<T>>,
  space: Condvar,
  subscriber: Mutex<BoxedSubscriber<T>>,
  executor: SharedExecutor,
  capacity: usize,
}

struct Buffer<T> {
  items: VecDeque<T>,
  terminal: Option<Terminal>,
  /// A terminal signal was delivered, or `on_next` failed.
  done: bool,
}

impl<T> Buffer<T> {
  /// An error preempts buffered items; completion waits until they are
  /// delivered.
  fn terminal_due(&self) -> bool {
    match &self.terminal {
      Some(Terminal::Error(_)) => true,
      Some(Terminal::Complete) => self.items.is_empty(),
      None => false,
    }
  }
}

enum Step<T> {
  Next(T),
  Terminate(Terminal),
}

impl<T: Send + 'static> BufferedSubscription<T> {
  fn new(
    subscriber: BoxedSubscriber<T>, executor: SharedExecutor, capacity: usize,
  ) -> Arc<Self> {
    Arc::new_cyclic(|this| BufferedSubscription {
      this: this.clone(),
      demand: Demand::new(),
      cancelled: AtomicBool::new(false),
      scheduled: AtomicBool::new(true),
      buffer: Mutex::new(Buffer { items: VecDeque::new(), terminal: None, done: false }),
      space: Condvar::new(),
      subscriber: Mutex::new(subscriber),
      executor,
      capacity,
    })
  }

  fn buffered(&self) -> usize { self.buffer.lock().items.len() }

  /// Allows draining once `on_subscribe` returned.
  fn activate(&self) {
    self.scheduled.store(false, Ordering::SeqCst);
    if self.has_work() {
      self.schedule();
    }
  }

  /// Appends `item`, waiting for space. Returns `false` if the subscriber is
  /// gone or terminated, in which case the item is dropped.
  fn offer(&self, item: T) -> bool {
    {
      let mut buffer = self.buffer.lock();
      loop {
        if self.is_cancelled() || buffer.done || buffer.terminal.is_some() {
          return false;
        }
        if buffer.items.len() < self.capacity {
          break;
        }
        trace!(capacity = self.capacity, "buffer full, waiting");
        self.space.wait(&mut buffer);
      }
      buffer.items.push_back(item);
    }
    self.schedule();
    true
  }

  fn mark_terminal(&self, terminal: Terminal) {
    {
      let mut buffer = self.buffer.lock();
      if buffer.done || buffer.terminal.is_some() {
        return;
      }
      if let Terminal::Error(_) = terminal {
        buffer.items.clear();
      }
      buffer.terminal = Some(terminal);
      self.space.notify_all();
    }
    self.schedule();
  }

  fn schedule(&self) {
    if self.scheduled.swap(true, Ordering::SeqCst) {
      return;
    }
    match self.this.upgrade() {
      Some(this) => self.executor.execute(Box::new(move || this.drain())),
      None => self.scheduled.store(false, Ordering::SeqCst),
    }
  }

  fn drain(&self) {
    loop {
      self.run();
      self.scheduled.store(false, Ordering::SeqCst);
      if !self.has_work() || self.scheduled.swap(true, Ordering::SeqCst) {
        return;
      }
    }
  }

  /// Whether a drain would deliver anything right now. Must agree with
  /// [`run`](Self::run), or `drain` never settles.
  fn has_work(&self) -> bool {
    if self.is_cancelled() {
      return false;
    }
    let buffer = self.buffer.lock();
    !buffer.done
      && (buffer.terminal_due() || (!buffer.items.is_empty() && self.demand.is_positive()))
  }

  /// Delivers until the buffer is empty, demand runs out, or the subscriber
  /// terminated.
  fn run(&self) {
    let mut subscriber = self.subscriber.lock();
    loop {
      if self.is_cancelled() {
        return;
      }
      let step = {
        let mut buffer = self.buffer.lock();
        if buffer.done {
          return;
        }
        if buffer.terminal_due() {
          buffer.done = true;
          buffer.items.clear();
          self.space.notify_all();
          match buffer.terminal.clone() {
            Some(terminal) => Step::Terminate(terminal),
            None => return,
          }
        } else if !buffer.items.is_empty() && self.demand.try_take() {
          match buffer.items.pop_front() {
            Some(item) => {
              self.space.notify_all();
              Step::Next(item)
            }
            None => return,
          }
        } else {
          return;
        }
      };

      match step {
        Step::Next(item) => {
          if let Err(failure) = subscriber.on_next(item) {
            self.fail(&mut subscriber, failure);
            return;
          }
        }
        Step::Terminate(terminal) => {
          terminal.deliver::<T, _>(&mut *subscriber);
          return;
        }
      }
    }
  }

  fn fail(&self, subscriber: &mut BoxedSubscriber<T>, failure: Failure) {
    {
      let mut buffer = self.buffer.lock();
      buffer.done = true;
      buffer.items.clear();
      self.space.notify_all();
    }
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      warn!(%failure, "subscriber failed in on_next, subscription cancelled");
      subscriber.on_error(failure);
    }
  }
}

impl<T: Send + 'static> SubscriptionLike for BufferedSubscription<T> {
  fn request(&self, n: u64) -> Result<(), FlowError> {
    if self.is_cancelled() {
      return Err(FlowError::AlreadyClosed);
    }
    let total = self.demand.add(n)?;
    trace!(n, total, "demand requested");
    self.schedule();
    Ok(())
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let mut buffer = self.buffer.lock();
    buffer.items.clear();
    self.space.notify_all();
    debug!("subscription cancelled");
  }

  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}
