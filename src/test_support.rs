use std::{
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
  error::{Failure, FlowError},
  subscriber::{ReplayableSubscriber, Subscriber},
  subscription::{Subscription, SubscriptionCell},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event<T> {
  Next(T),
  Replay(T),
  Error(String),
  Complete,
}

/// Records every signal it receives. Clones share the record.
#[derive(Clone)]
pub(crate) struct Recorder<T> {
  events: Arc<Mutex<Vec<Event<T>>>>,
  subscription: SubscriptionCell,
  initial_request: u64,
  fail_on: Option<T>,
}

impl<T: Clone + PartialEq> Recorder<T> {
  pub(crate) fn new(initial_request: u64) -> Self {
    Recorder {
      events: Arc::new(Mutex::new(vec![])),
      subscription: SubscriptionCell::new(),
      initial_request,
      fail_on: None,
    }
  }

  /// Makes `on_next` fail when it receives `item`.
  pub(crate) fn failing_on(mut self, item: T) -> Self {
    self.fail_on = Some(item);
    self
  }

  pub(crate) fn events(&self) -> Vec<Event<T>> { self.events.lock().clone() }

  pub(crate) fn items(&self) -> Vec<T> {
    self
      .events
      .lock()
      .iter()
      .filter_map(|e| match e {
        Event::Next(v) => Some(v.clone()),
        _ => None,
      })
      .collect()
  }

  pub(crate) fn subscription(&self) -> SubscriptionCell { self.subscription.clone() }

  pub(crate) fn is_terminated(&self) -> bool {
    self
      .events
      .lock()
      .iter()
      .any(|e| matches!(e, Event::Error(_) | Event::Complete))
  }
}

impl<T: Clone + PartialEq> Subscriber<T> for Recorder<T> {
  fn on_subscribe(&mut self, subscription: Subscription) -> Result<(), FlowError> {
    self.subscription.set(subscription.clone())?;
    if self.initial_request > 0 {
      subscription.request(self.initial_request)?;
    }
    Ok(())
  }

  fn on_next(&mut self, item: T) -> Result<(), Failure> {
    if self.fail_on.as_ref() == Some(&item) {
      return Err(Failure::msg("recorder failure"));
    }
    self.events.lock().push(Event::Next(item));
    Ok(())
  }

  fn on_error(&mut self, failure: Failure) {
    self.events.lock().push(Event::Error(failure.to_string()));
  }

  fn on_complete(&mut self) { self.events.lock().push(Event::Complete); }
}

impl<T: Clone + PartialEq> ReplayableSubscriber<T> for Recorder<T> {
  fn replay(&mut self, item: T) -> Result<(), FlowError> {
    self.events.lock().push(Event::Replay(item));
    Ok(())
  }
}

/// Polls `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if cond() {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    thread::sleep(Duration::from_millis(2));
  }
}
