use std::{
  fmt::{Debug, Formatter},
  marker::PhantomData,
  sync::Arc,
};

use parking_lot::Mutex;
use tracing::debug;

use super::{CollectFuture, Completion};
use crate::{
  error::{Failure, FlowError},
  subscriber::{ReplayableSubscriber, Subscriber},
  subscription::Subscription,
};

/// Subscriber collecting every item into a container until the publisher
/// completes.
///
/// It requests one item on subscribe and one more after each item.
/// [`future`](CollectorSubscriber::future) resolves with a copy of the
/// container on completion, or with the failure on error.
///
/// Clones share the container, so keep a clone to inspect progress after
/// subscribing.
pub struct CollectorSubscriber<T, C> {
  state: Arc<Mutex<State<C>>>,
  _item: PhantomData<fn(T)>,
}

struct State<C> {
  items: C,
  len: usize,
  subscription: Option<Subscription>,
  completion: Completion<C>,
}

impl<T, C> CollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  pub fn new(container: C) -> Self {
    CollectorSubscriber {
      state: Arc::new(Mutex::new(State {
        items: container,
        len: 0,
        subscription: None,
        completion: Completion::new(),
      })),
      _item: PhantomData,
    }
  }

  pub fn future(&self) -> CollectFuture<C> { self.state.lock().completion.future() }

  /// Runs `f` on the collected items.
  pub fn with_items<U>(&self, f: impl FnOnce(&C) -> U) -> U { f(&self.state.lock().items) }

  /// Copy of the collected items.
  pub fn snapshot(&self) -> C { self.state.lock().items.clone() }

  pub fn is_done(&self) -> bool { self.state.lock().completion.is_done() }
}

impl<T, C> CollectorSubscriber<T, C> {
  pub fn subscription(&self) -> Option<Subscription> { self.state.lock().subscription.clone() }

  pub fn is_subscribed(&self) -> bool { self.state.lock().subscription.is_some() }

  /// Number of items collected, replayed ones included.
  pub fn len(&self) -> usize { self.state.lock().len }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<T, C> Subscriber<T> for CollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    {
      let mut state = self.state.lock();
      if state.subscription.is_some() {
        return Err(FlowError::AlreadySubscribed);
      }
      state.subscription = Some(subscription.clone());
    }
    subscription.request(1)
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    let subscription = {
      let mut state = self.state.lock();
      if state.completion.is_done() {
        return Ok(());
      }
      state.items.extend(Some(item));
      state.len += 1;
      state.subscription.clone()
    };
    if let Some(subscription) = subscription {
      subscription.request(1)?;
    }
    Ok(())
  }

  fn on_error(&mut self, failure: Failure) {
    debug!(%failure, "collector failed");
    self.state.lock().completion.complete(Err(failure));
  }

  fn on_complete(&mut self) {
    let mut state = self.state.lock();
    let items = state.items.clone();
    debug!(len = state.len, "collector completed");
    state.completion.complete(Ok(items));
  }
}

impl<T, C> ReplayableSubscriber<T> for CollectorSubscriber<T, C>
where
  C: Extend<T> + Clone,
{
  fn replay(&mut self, item: T) -> Result<(), FlowError> {
    let mut state = self.state.lock();
    if state.subscription.is_some() {
      return Err(FlowError::ReplayAfterSubscribe);
    }
    state.items.extend(Some(item));
    state.len += 1;
    Ok(())
  }
}

impl<T, C> Clone for CollectorSubscriber<T, C> {
  fn clone(&self) -> Self { CollectorSubscriber { state: self.state.clone(), _item: PhantomData } }
}

impl<T, C: Debug> Debug for CollectorSubscriber<T, C> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("CollectorSubscriber")
      .field("items", &state.items)
      .field("subscribed", &state.subscription.is_some())
      .field("done", &state.completion.is_done())
      .finish()
  }
}
