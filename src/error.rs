//! Error types shared by publishers, subscribers and subscriptions.
//!
//! Two kinds of errors flow through the crate:
//!
//! - [`FlowError`] is returned synchronously to a caller that broke the
//!   publish/subscribe protocol (subscribing to a closed publisher, requesting
//!   zero items, subscribing the same subscriber twice, ...).
//! - [`Failure`] is the cloneable, type-erased error carried downstream by
//!   [`Subscriber::on_error`](crate::subscriber::Subscriber::on_error). A
//!   single failure may be broadcast to many subscribers, so it is reference
//!   counted.

use std::{
  error::Error as StdError,
  fmt::{Debug, Display, Formatter},
  sync::Arc,
};

/// Protocol violations reported to the offending caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
  /// The publisher or subscription was already closed or cancelled.
  #[error("already closed")]
  AlreadyClosed,
  /// The subscriber already holds a subscription.
  #[error("already subscribed")]
  AlreadySubscribed,
  /// The subscriber has not received a subscription yet.
  #[error("not subscribed")]
  NotSubscribed,
  /// `request` was called with a non-positive amount.
  #[error("requested number of items must be positive")]
  NonPositiveRequest,
  /// `replay` was called after the subscriber received its subscription.
  #[error("replay possible only before subscribe")]
  ReplayAfterSubscribe,
  /// `submit` was called from a subscriber callback that the same publisher
  /// is running.
  #[error("submit called from within a delivery of the same publisher")]
  ReentrantSubmit,
  /// The producing side of a collector future went away before completing it.
  #[error("collector was dropped before it completed")]
  Abandoned,
}

/// A cloneable error delivered to subscribers through `on_error`.
///
/// `Failure` keeps the original error so subscribers can inspect it with
/// [`Failure::downcast_ref`], and its [`Display`] output is the original
/// message. Any `std::error::Error` converts into a `Failure`, which lets
/// transform functions and callbacks use `?`.
///
/// ```rust
/// use rxflow::prelude::*;
///
/// let failure = Failure::from(FlowError::AlreadyClosed);
/// assert_eq!(failure.to_string(), "already closed");
/// assert_eq!(failure.downcast_ref::<FlowError>(), Some(&FlowError::AlreadyClosed));
///
/// let adhoc = Failure::msg("test");
/// assert_eq!(adhoc.to_string(), "test");
/// ```
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
  /// Wraps an error value.
  pub fn new<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Failure(Arc::new(err))
  }

  /// Creates a failure from a plain message.
  pub fn msg(message: impl Into<String>) -> Self { Failure(Arc::new(Message(message.into()))) }

  /// Returns the original error if it is of type `E`.
  pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> { self.0.downcast_ref::<E>() }

  /// Borrows the wrapped error.
  pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) { &*self.0 }

  /// Whether both handles point at the same underlying error.
  pub fn ptr_eq(&self, other: &Failure) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl<E> From<E> for Failure
where
  E: StdError + Send + Sync + 'static,
{
  fn from(err: E) -> Self { Failure::new(err) }
}

impl Display for Failure {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { Display::fmt(&self.0, f) }
}

impl Debug for Failure {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_tuple("Failure").field(&self.0).finish()
  }
}

#[derive(Debug)]
struct Message(String);

impl Display for Message {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl StdError for Message {}
