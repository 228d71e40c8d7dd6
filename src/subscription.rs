//! Subscription handles: per-subscriber demand and cancellation.
//!
//! Every publisher hands each subscriber exactly one [`Subscription`] through
//! `on_subscribe`. The subscriber uses it to grant credit with
//! [`Subscription::request`] and to stop the flow with
//! [`Subscription::cancel`]. Publishers provide their own
//! [`SubscriptionLike`] implementation behind the handle.

mod demand;
mod registry;

use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

pub use demand::Demand;
use parking_lot::Mutex;
pub use registry::Registry;

use crate::error::FlowError;

/// The control surface a publisher exposes to one subscriber.
pub trait SubscriptionLike: Send + Sync {
  /// Adds `n` items to the outstanding demand.
  ///
  /// Fails with [`FlowError::NonPositiveRequest`] when `n` is zero and with
  /// [`FlowError::AlreadyClosed`] once the subscription is cancelled.
  fn request(&self, n: u64) -> Result<(), FlowError>;

  /// Stops delivery to this subscription. Calling it again has no effect.
  fn cancel(&self);

  fn is_cancelled(&self) -> bool;
}

/// Cloneable handle to a [`SubscriptionLike`].
#[derive(Clone)]
pub struct Subscription(Arc<dyn SubscriptionLike>);

impl Subscription {
  pub fn new<S: SubscriptionLike + 'static>(subscription: S) -> Self {
    Subscription(Arc::new(subscription))
  }

  pub fn from_arc<S: SubscriptionLike + 'static>(subscription: Arc<S>) -> Self {
    Subscription(subscription)
  }

  #[inline]
  pub fn request(&self, n: u64) -> Result<(), FlowError> { self.0.request(n) }

  #[inline]
  pub fn cancel(&self) { self.0.cancel() }

  #[inline]
  pub fn is_cancelled(&self) -> bool { self.0.is_cancelled() }

  /// Whether both handles control the same subscription.
  pub fn ptr_eq(&self, other: &Subscription) -> bool { Arc::ptr_eq(&self.0, &other.0) }

  /// Whether this handle was made from `subscription`.
  pub(crate) fn controls<S: SubscriptionLike>(&self, subscription: &Arc<S>) -> bool {
    Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(subscription) as *const ()
  }

  /// Activates "RAII" behavior for this subscription. That means `cancel()`
  /// will be called automatically as soon as the returned value goes out of
  /// scope.
  ///
  /// **Attention:** If you don't assign the return value to a variable,
  /// `cancel()` is called immediately, which is probably not what you want!
  pub fn cancel_when_dropped(self) -> SubscriptionGuard { SubscriptionGuard(self) }
}

impl Debug for Subscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("is_cancelled", &self.is_cancelled())
      .finish()
  }
}

/// An RAII implementation of a "scoped subscription". When this structure is
/// dropped (falls out of scope), the subscription will be cancelled.
///
/// If you want to drop it immediately, wrap it in its own scope.
#[derive(Debug)]
#[must_use]
pub struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
  pub fn subscription(&self) -> &Subscription { &self.0 }
}

impl Drop for SubscriptionGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}

/// Shared slot a subscriber stores its subscription in, so that clones of the
/// subscriber (or code holding the cell) can reach the subscription after the
/// subscriber itself was moved into a publisher.
#[derive(Clone, Default)]
pub struct SubscriptionCell(Arc<Mutex<Option<Subscription>>>);

impl SubscriptionCell {
  pub fn new() -> Self { Self::default() }

  /// Stores the subscription. Fails if one is already stored.
  pub fn set(&self, subscription: Subscription) -> Result<(), FlowError> {
    let mut slot = self.0.lock();
    if slot.is_some() {
      return Err(FlowError::AlreadySubscribed);
    }
    *slot = Some(subscription);
    Ok(())
  }

  pub fn get(&self) -> Option<Subscription> { self.0.lock().clone() }

  pub fn is_set(&self) -> bool { self.0.lock().is_some() }

  /// Requests `n` more items on the stored subscription.
  pub fn request(&self, n: u64) -> Result<(), FlowError> {
    match self.get() {
      Some(subscription) => subscription.request(n),
      None => Err(FlowError::NotSubscribed),
    }
  }

  /// Cancels the stored subscription, if any.
  pub fn cancel(&self) {
    if let Some(subscription) = self.get() {
      subscription.cancel();
    }
  }
}

impl Debug for SubscriptionCell {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("SubscriptionCell").field(&self.get()).finish()
  }
}
