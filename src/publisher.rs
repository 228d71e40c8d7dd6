//! Publishers: the producing side of a flow.
//!
//! | Type | Delivery |
//! |------|----------|
//! | [`SynchronousPublisher`] | on the submitting thread, no buffering, `submit` blocks until someone took the item |
//! | [`BufferedPublisher`] | on an [`Executor`](crate::executor::Executor), through a bounded per-subscriber buffer |
//! | [`ReplayablePublisher`] | buffered, and replays recent distinct items to new subscribers |

mod buffered;
mod replayable;
mod signal;
mod synchronous;

use std::sync::Arc;

pub use buffered::{BufferedPublisher, DEFAULT_BUFFER_CAPACITY};
pub use replayable::ReplayablePublisher;
pub(crate) use signal::Signal;
pub use synchronous::SynchronousPublisher;

use crate::{
  error::{Failure, FlowError},
  subscriber::{BoxedSubscriber, Subscriber},
};

/// Something subscribers can subscribe to.
pub trait Publisher<T> {
  /// Registers a boxed subscriber.
  ///
  /// The subscriber's `on_subscribe` is called before this method returns.
  /// Fails with [`FlowError::AlreadyClosed`] if the publisher is closed, or
  /// with whatever error `on_subscribe` returned.
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<T>) -> Result<(), FlowError>;

  /// Registers a subscriber. See [`Publisher::subscribe_boxed`].
  fn subscribe<S>(&self, subscriber: S) -> Result<(), FlowError>
  where
    S: Subscriber<T> + Send + 'static,
    Self: Sized,
  {
    self.subscribe_boxed(Box::new(subscriber))
  }
}

impl<T, P> Publisher<T> for Arc<P>
where
  P: Publisher<T> + ?Sized,
{
  #[inline]
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<T>) -> Result<(), FlowError> {
    (**self).subscribe_boxed(subscriber)
  }
}

impl<T, P> Publisher<T> for &P
where
  P: Publisher<T> + ?Sized,
{
  #[inline]
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<T>) -> Result<(), FlowError> {
    (**self).subscribe_boxed(subscriber)
  }
}

/// How a publisher ended.
#[derive(Clone, Debug)]
pub(crate) enum Terminal {
  Complete,
  Error(Failure),
}

impl Terminal {
  pub(crate) fn deliver<T, S>(self, subscriber: &mut S)
  where
    S: Subscriber<T> + ?Sized,
  {
    match self {
      Terminal::Complete => subscriber.on_complete(),
      Terminal::Error(failure) => subscriber.on_error(failure),
    }
  }
}
