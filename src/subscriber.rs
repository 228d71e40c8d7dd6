//! Subscriber traits and the closure adapter
//!
//! A [`Subscriber`] receives the subscription, then items, then at most one
//! terminal signal (error or completion) from a publisher. A
//! [`ReplayableSubscriber`] can additionally accept catch-up items before it
//! is subscribed.

use std::fmt::{Debug, Formatter};

use tracing::warn;

use crate::{
  error::{Failure, FlowError},
  subscription::{Subscription, SubscriptionCell},
};

// ============================================================================
// Subscriber Trait
// ============================================================================

/// Subscriber trait: the consumer side of a publisher.
///
/// Publishers call the methods in this order: `on_subscribe` exactly once,
/// `on_next` at most as many times as the subscriber requested, then either
/// `on_error` or `on_complete` at most once.
pub trait Subscriber<T> {
  /// Receives the subscription used to request items and cancel.
  ///
  /// Returning an error aborts the registration; the publisher reports the
  /// error to the caller of `subscribe`. Subscribers that are already
  /// subscribed must return [`FlowError::AlreadySubscribed`].
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError>;

  /// Receives the next item.
  ///
  /// Returning an error makes the publisher cancel this subscription and
  /// deliver the failure to `on_error`. Other subscribers are not affected.
  fn on_next(&mut self, item: T) -> Result<(), Failure>;

  /// Receives a terminal failure.
  fn on_error(&mut self, failure: Failure);

  /// Receives the terminal completion signal.
  fn on_complete(&mut self);
}

/// A subscriber able to receive catch-up items before it is subscribed.
///
/// `replay` is passive: it does not consume demand, and it must not call back
/// into the publisher that replays.
pub trait ReplayableSubscriber<T>: Subscriber<T> {
  /// Receives one previously published item.
  fn replay(&mut self, item: T) -> Result<(), FlowError>;
}

/// Boxed subscriber that can be moved to the thread delivering items.
pub type BoxedSubscriber<T> = Box<dyn Subscriber<T> + Send>;

impl<T, S> Subscriber<T> for Box<S>
where
  S: Subscriber<T> + ?Sized,
{
  #[inline]
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    (**self).on_subscribe(subscription)
  }

  #[inline]
  fn on_next(&mut self, item: T) -> Result<(), Failure> { (**self).on_next(item) }

  #[inline]
  fn on_error(&mut self, failure: Failure) { (**self).on_error(failure) }

  #[inline]
  fn on_complete(&mut self) { (**self).on_complete() }
}

impl<T, S> ReplayableSubscriber<T> for Box<S>
where
  S: ReplayableSubscriber<T> + ?Sized,
{
  #[inline]
  fn replay(&mut self, item: T) -> Result<(), FlowError> { (**self).replay(item) }
}

// ============================================================================
// FnSubscriber - Closure adapter
// ============================================================================

/// Subscriber backed by a closure.
///
/// On subscribe it requests `initial_request` items (one by default). It
/// requests nothing more on its own unless [`FnSubscriber::keep_requesting`]
/// is set, in which case it asks for one more item after each delivery. The
/// subscription stays reachable through [`FnSubscriber::subscription`] after
/// the subscriber was moved into a publisher.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use rxflow::prelude::*;
///
/// let publisher = SynchronousPublisher::new();
/// let seen = Arc::new(Mutex::new(vec![]));
/// let c_seen = seen.clone();
/// let subscriber = FnSubscriber::new(move |v: i32| c_seen.lock().unwrap().push(v));
/// let subscription = subscriber.subscription();
/// publisher.subscribe(subscriber).unwrap();
///
/// subscription.request(1).unwrap();
/// publisher.submit(1).unwrap();
/// publisher.submit(2).unwrap();
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
pub struct FnSubscriber<F> {
  on_next: F,
  on_error: Option<Box<dyn FnMut(Failure) + Send>>,
  on_complete: Option<Box<dyn FnMut() + Send>>,
  initial_request: u64,
  keep_requesting: bool,
  subscription: SubscriptionCell,
}

impl<F> FnSubscriber<F> {
  pub fn new(on_next: F) -> Self {
    FnSubscriber {
      on_next,
      on_error: None,
      on_complete: None,
      initial_request: 1,
      keep_requesting: false,
      subscription: SubscriptionCell::new(),
    }
  }

  /// How many items to request once subscribed. Zero requests nothing.
  pub fn with_initial_request(mut self, n: u64) -> Self {
    self.initial_request = n;
    self
  }

  /// Request one more item after each delivered item.
  pub fn keep_requesting(mut self) -> Self {
    self.keep_requesting = true;
    self
  }

  pub fn with_on_error(mut self, f: impl FnMut(Failure) + Send + 'static) -> Self {
    self.on_error = Some(Box::new(f));
    self
  }

  pub fn with_on_complete(mut self, f: impl FnMut() + Send + 'static) -> Self {
    self.on_complete = Some(Box::new(f));
    self
  }

  /// Handle to the subscription this subscriber will receive.
  pub fn subscription(&self) -> SubscriptionCell { self.subscription.clone() }
}

impl<F, T> Subscriber<T> for FnSubscriber<F>
where
  F: FnMut(T),
{
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    self.subscription.set(subscription.clone())?;
    if self.initial_request > 0 {
      subscription.request(self.initial_request)?;
    }
    Ok(())
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    (self.on_next)(item);
    if self.keep_requesting {
      self.subscription.request(1)?;
    }
    Ok(())
  }

  fn on_error(&mut self, failure: Failure) {
    match self.on_error.as_mut() {
      Some(f) => f(failure),
      None => warn!(%failure, "unhandled subscriber error"),
    }
  }

  fn on_complete(&mut self) {
    if let Some(f) = self.on_complete.as_mut() {
      f();
    }
  }
}

impl<F> Debug for FnSubscriber<F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FnSubscriber")
      .field("initial_request", &self.initial_request)
      .field("keep_requesting", &self.keep_requesting)
      .field("subscription", &self.subscription)
      .finish()
  }
}

// ============================================================================
// Tests
// ============================================================================
