//! Transform stages: map and filter items between a publisher and its
//! subscribers.
//!
//! - [`TransformSubscriber`] wraps one downstream subscriber.
//! - [`TransformPublisher`] wraps an upstream publisher; every subscriber
//!   subscribing to it gets its own [`TransformSubscriber`].
//! - [`TransformProcessor`] subscribes once upstream and multicasts the
//!   transformed items to any number of downstream subscribers.
//!
//! A transform function of a [`TransformSubscriber`] or [`TransformPublisher`]
//! returns `Ok(Some(r))` to forward `r`, `Ok(None)` to drop the item (one more
//! item is requested upstream in its place), and `Err(failure)` to fail the
//! stage: downstream receives `on_error` and the upstream subscription is
//! cancelled. A [`TransformProcessor`] maps every item to exactly one output,
//! so its function returns `Result<R, Failure>`.
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let publisher = BufferedPublisher::same_thread();
//! let collector = FixedCollectorSubscriber::new(Vec::new(), 3);
//! let future = collector.future();
//! publisher
//!   .clone()
//!   .filter(|v: &i32| v % 2 == 0)
//!   .map(|v: i32| v.to_string())
//!   .subscribe(collector)
//!   .unwrap();
//!
//! for i in 0..6 {
//!   publisher.submit(i).unwrap();
//! }
//! let collected = futures::executor::block_on(future).unwrap();
//! assert_eq!(collected, vec!["0", "2", "4"]);
//! ```

mod processor;
mod publisher;
mod subscriber;

pub use processor::TransformProcessor;
pub use publisher::TransformPublisher;
pub use subscriber::TransformSubscriber;

use crate::{error::Failure, publisher::Publisher};

/// Lifecycle of a transform stage.
///
/// `Created → Subscribed → Streaming → {Errored | Completed}`. Once terminal,
/// every further signal is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
  Created,
  Subscribed,
  Streaming,
  Errored,
  Completed,
}

impl StageState {
  #[inline]
  pub fn is_terminal(self) -> bool { matches!(self, StageState::Errored | StageState::Completed) }

  #[inline]
  pub fn is_subscribed(self) -> bool { matches!(self, StageState::Subscribed | StageState::Streaming) }
}

/// Transform adaptors for every [`Publisher`].
pub trait PublisherExt<T>: Publisher<T> + Sized {
  /// Wraps this publisher with a fallible filter-map function.
  fn transform<R, F>(self, f: F) -> TransformPublisher<Self, T, R>
  where
    F: Fn(T) -> Result<Option<R>, Failure> + Send + Sync + 'static,
  {
    TransformPublisher::new(self, f)
  }

  fn map<R, F>(self, f: F) -> TransformPublisher<Self, T, R>
  where
    F: Fn(T) -> R + Send + Sync + 'static,
  {
    TransformPublisher::new(self, move |v| Ok(Some(f(v))))
  }

  fn filter<F>(self, f: F) -> TransformPublisher<Self, T, T>
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    TransformPublisher::new(self, move |v| Ok(if f(&v) { Some(v) } else { None }))
  }

  fn filter_map<R, F>(self, f: F) -> TransformPublisher<Self, T, R>
  where
    F: Fn(T) -> Option<R> + Send + Sync + 'static,
  {
    TransformPublisher::filter_map(self, f)
  }
}

impl<T, P> PublisherExt<T> for P where P: Publisher<T> {}
