use std::fmt::{Debug, Formatter};

use tracing::{debug, trace};

use super::StageState;
use crate::{
  error::{Failure, FlowError},
  subscriber::Subscriber,
  subscription::Subscription,
};

/// Subscriber applying a filter-map function before handing items to a
/// downstream subscriber.
///
/// The upstream subscription is passed through to the downstream subscriber,
/// so downstream demand is upstream demand. Filtered items are replaced by a
/// `request(1)` upstream.
pub struct TransformSubscriber<S, F> {
  downstream: S,
  transform: F,
  upstream: Option<Subscription>,
  state: StageState,
}

impl<S, F> TransformSubscriber<S, F> {
  pub fn new(downstream: S, transform: F) -> Self {
    TransformSubscriber { downstream, transform, upstream: None, state: StageState::Created }
  }

  #[inline]
  pub fn state(&self) -> StageState { self.state }

  #[inline]
  pub fn downstream(&self) -> &S { &self.downstream }
}

impl<T, R, S, F> Subscriber<T> for TransformSubscriber<S, F>
where
  S: Subscriber<R>,
  F: FnMut(T) -> Result<Option<R>, Failure>,
{
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    if self.state != StageState::Created {
      return Err(FlowError::AlreadySubscribed);
    }
    self.downstream.on_subscribe(subscription.clone())?;
    self.upstream = Some(subscription);
    self.state = StageState::Subscribed;
    Ok(())
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    if !self.state.is_subscribed() {
      return Ok(());
    }
    self.state = StageState::Streaming;
    match (self.transform)(item) {
      Ok(Some(value)) => self.downstream.on_next(value),
      Ok(None) => {
        trace!("item filtered out");
        match &self.upstream {
          Some(upstream) => upstream.request(1).map_err(Failure::from),
          None => Ok(()),
        }
      }
      Err(failure) => {
        debug!(%failure, "transform failed, cancelling upstream");
        self.state = StageState::Errored;
        if let Some(upstream) = self.upstream.take() {
          upstream.cancel();
        }
        self.downstream.on_error(failure);
        Ok(())
      }
    }
  }

  fn on_error(&mut self, failure: Failure) {
    if self.state.is_terminal() {
      return;
    }
    self.state = StageState::Errored;
    self.downstream.on_error(failure);
  }

  fn on_complete(&mut self) {
    if self.state.is_terminal() {
      return;
    }
    self.state = StageState::Completed;
    self.downstream.on_complete();
  }
}

impl<S: Debug, F> Debug for TransformSubscriber<S, F> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransformSubscriber")
      .field("state", &self.state)
      .field("downstream", &self.downstream)
      .finish()
  }
}
