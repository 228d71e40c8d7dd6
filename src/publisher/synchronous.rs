use std::{
  fmt::{Debug, Formatter},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::{self, ThreadId},
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{Publisher, Signal, Terminal};
use crate::{
  error::{Failure, FlowError},
  subscriber::BoxedSubscriber,
  subscription::{Demand, Registry, Subscription, SubscriptionLike},
};

/// Publisher without any buffering: the thread calling
/// [`submit`](SynchronousPublisher::submit) delivers the item itself.
///
/// `submit` offers the item to every registered subscriber that has
/// outstanding demand, in registration order. If nobody has demand, the call
/// blocks until a subscriber subscribes or requests more items, and tries
/// again. Items are never dropped: `submit` returns only once at least one
/// subscriber received the item, or once the publisher is closed (in which
/// case the pending item is abandoned).
///
/// One `submit` satisfies *every* eligible subscriber, not just the first
/// one: each subscriber with demand gets its own copy of the item.
///
/// ```rust
/// use std::thread;
///
/// use rxflow::prelude::*;
///
/// let publisher = SynchronousPublisher::new();
/// let collector = FixedCollectorSubscriber::new(Vec::new(), 3);
/// let future = collector.future();
///
/// let producer = publisher.clone();
/// let handle = thread::spawn(move || {
///   // Blocks until the collector below subscribes.
///   for i in 0..3 {
///     producer.submit(i).unwrap();
///   }
/// });
///
/// publisher.subscribe(collector).unwrap();
/// assert_eq!(futures::executor::block_on(future).unwrap(), vec![0, 1, 2]);
/// handle.join().unwrap();
/// ```
///
/// Cloning the publisher yields another handle to the same publisher.
/// Dropping the last handle closes it.
pub struct SynchronousPublisher<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  state: Mutex<State<T>>,
  signal: Arc<Signal>,
  /// Serializes the "check demand, deliver" scans of concurrent submitters.
  delivery: Mutex<()>,
  /// Thread currently running a scan.
  deliverer: Mutex<Option<ThreadId>>,
}

struct State<T> {
  terminal: Option<Terminal>,
  registry: Registry<Arc<Registration<T>>>,
}

impl<T> SynchronousPublisher<T> {
  pub fn new() -> Self {
    SynchronousPublisher {
      inner: Arc::new(Inner {
        state: Mutex::new(State { terminal: None, registry: Registry::new() }),
        signal: Arc::new(Signal::new()),
        delivery: Mutex::new(()),
        deliverer: Mutex::new(None),
      }),
    }
  }

  pub fn is_closed(&self) -> bool { self.inner.state.lock().terminal.is_some() }

  /// Number of registered, non-cancelled subscribers.
  pub fn subscriber_count(&self) -> usize {
    let mut state = self.inner.state.lock();
    state.registry.retain(|r| !r.is_cancelled());
    state.registry.len()
  }

  /// Completes every registered subscriber and rejects further submissions.
  ///
  /// Blocked `submit` calls return. Calling `close` or
  /// [`close_exceptionally`](Self::close_exceptionally) again has no effect.
  pub fn close(&self) { self.inner.terminate(Terminal::Complete); }

  /// Like [`close`](Self::close), but delivers `failure` through `on_error`.
  pub fn close_exceptionally(&self, failure: Failure) {
    self.inner.terminate(Terminal::Error(failure));
  }
}

impl<T: Clone> SynchronousPublisher<T> {
  /// Delivers `item` to every subscriber with outstanding demand, blocking
  /// until at least one subscriber received it.
  ///
  /// Fails with [`FlowError::AlreadyClosed`] if the publisher is closed when
  /// the call starts. If the publisher closes while the call waits, the item
  /// is abandoned and `Ok(())` is returned.
  ///
  /// Subscribers are called on this thread. They may request, cancel or
  /// subscribe others from their callbacks. Submitting to this publisher from
  /// a callback fails with [`FlowError::ReentrantSubmit`].
  pub fn submit(&self, item: T) -> Result<(), FlowError> {
    if self.is_closed() {
      return Err(FlowError::AlreadyClosed);
    }
    let current = thread::current().id();
    if *self.inner.deliverer.lock() == Some(current) {
      return Err(FlowError::ReentrantSubmit);
    }
    let _serial = self.inner.delivery.lock();
    let _deliverer = Deliverer::enter(&self.inner.deliverer, current);
    loop {
      let seen = self.inner.signal.generation();
      let targets = {
        let state = self.inner.state.lock();
        if state.terminal.is_some() {
          trace!("publisher closed while submitting, item abandoned");
          return Ok(());
        }
        state.registry.snapshot()
      };

      let mut delivered = false;
      for registration in targets.iter() {
        delivered |= registration.offer(&item);
      }

      self
        .inner
        .state
        .lock()
        .registry
        .retain(|r| !r.is_cancelled());
      if delivered {
        return Ok(());
      }
      trace!(subscribers = targets.len(), "no demand, waiting");
      self.inner.signal.wait_for_change(seen);
    }
  }
}

impl<T> Publisher<T> for SynchronousPublisher<T> {
  fn subscribe_boxed(&self, mut subscriber: BoxedSubscriber<T>) -> Result<(), FlowError> {
    if self.is_closed() {
      return Err(FlowError::AlreadyClosed);
    }
    let subscription = Arc::new(SyncSubscription::new(self.inner.signal.clone()));
    if let Err(err) = subscriber.on_subscribe(Subscription::from_arc(subscription.clone())) {
      subscription.cancel();
      return Err(err);
    }

    let registration = Arc::new(Registration::new(subscription, subscriber));
    let terminal = {
      let mut state = self.inner.state.lock();
      state.registry.retain(|r| !r.is_cancelled());
      match &state.terminal {
        Some(terminal) => Some(terminal.clone()),
        None => {
          state.registry.add(registration.clone());
          None
        }
      }
    };
    match terminal {
      // Closed while `on_subscribe` ran.
      Some(terminal) => registration.terminate(terminal),
      None => debug!("subscriber registered with synchronous publisher"),
    }
    self.inner.signal.notify();
    Ok(())
  }
}

impl<T> Inner<T> {
  fn terminate(&self, terminal: Terminal) {
    let targets: Vec<_> = {
      let mut state = self.state.lock();
      if state.terminal.is_some() {
        return;
      }
      state.terminal = Some(terminal.clone());
      state.registry.drain().collect()
    };
    debug!(subscribers = targets.len(), ?terminal, "synchronous publisher closed");
    for registration in targets {
      if !registration.is_cancelled() {
        registration.terminate(terminal.clone());
      }
    }
    self.signal.notify();
  }
}

impl<T> Drop for Inner<T> {
  fn drop(&mut self) { self.terminate(Terminal::Complete); }
}

impl<T> Default for SynchronousPublisher<T> {
  fn default() -> Self { Self::new() }
}

impl<T> Clone for SynchronousPublisher<T> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T> Debug for SynchronousPublisher<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("SynchronousPublisher")
      .field("closed", &state.terminal.is_some())
      .field("subscribers", &state.registry.len())
      .finish()
  }
}

/// Marks the thread running a scan until dropped.
struct Deliverer<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> Deliverer<'a> {
  fn enter(slot: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
    *slot.lock() = Some(thread);
    Deliverer(slot)
  }
}

impl Drop for Deliverer<'_> {
  fn drop(&mut self) { *self.0.lock() = None; }
}

// ============================================================================
// Subscription
// ============================================================================

struct SyncSubscription {
  demand: Demand,
  cancelled: AtomicBool,
  signal: Arc<Signal>,
}

impl SyncSubscription {
  fn new(signal: Arc<Signal>) -> Self {
    SyncSubscription { demand: Demand::new(), cancelled: AtomicBool::new(false), signal }
  }
}

impl SubscriptionLike for SyncSubscription {
  fn request(&self, n: u64) -> Result<(), FlowError> {
    if self.is_cancelled() {
      return Err(FlowError::AlreadyClosed);
    }
    let total = self.demand.add(n)?;
    trace!(n, total, "demand requested");
    self.signal.notify();
    Ok(())
  }

  fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      debug!("subscription cancelled");
    }
  }

  fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}

// ============================================================================
// Registration
// ============================================================================

/// One subscriber together with its subscription.
///
/// The subscriber lock is held while a callback runs, so callbacks for one
/// subscriber never overlap. A terminal signal that arrives while an `on_next`
/// is running is parked in `pending` and delivered by whoever releases the
/// subscriber lock next, which keeps `close` callable from inside `on_next`.
struct Registration<T> {
  subscription: Arc<SyncSubscription>,
  slot: Mutex<Slot<T>>,
  pending: Mutex<Option<Terminal>>,
}

struct Slot<T> {
  subscriber: BoxedSubscriber<T>,
  done: bool,
}

impl<T> Registration<T> {
  fn new(subscription: Arc<SyncSubscription>, subscriber: BoxedSubscriber<T>) -> Self {
    Registration {
      subscription,
      slot: Mutex::new(Slot { subscriber, done: false }),
      pending: Mutex::new(None),
    }
  }

  fn is_cancelled(&self) -> bool { self.subscription.is_cancelled() }

  /// Delivers `item` if this subscriber has demand. Returns whether it did.
  fn offer(&self, item: &T) -> bool
  where
    T: Clone,
  {
    if self.is_cancelled() {
      return false;
    }
    let delivered = {
      let mut slot = self.slot.lock();
      if slot.done || self.is_cancelled() || !self.subscription.demand.try_take() {
        false
      } else {
        match slot.subscriber.on_next(item.clone()) {
          Ok(()) => true,
          Err(failure) => {
            slot.done = true;
            if !self.subscription.cancelled.swap(true, Ordering::AcqRel) {
              warn!(%failure, "subscriber failed in on_next, subscription cancelled");
              slot.subscriber.on_error(failure);
            }
            false
          }
        }
      }
    };
    self.flush_terminal();
    delivered
  }

  fn terminate(&self, terminal: Terminal) {
    {
      let mut pending = self.pending.lock();
      if pending.is_none() {
        *pending = Some(terminal);
      }
    }
    self.flush_terminal();
  }

  fn flush_terminal(&self) {
    loop {
      if self.pending.lock().is_none() {
        return;
      }
      let Some(mut slot) = self.slot.try_lock() else {
        // The holder flushes after it releases the lock.
        return;
      };
      if let Some(terminal) = self.pending.lock().take() {
        if !slot.done {
          slot.done = true;
          terminal.deliver::<T, _>(&mut slot.subscriber);
        }
      }
    }
  }
}
