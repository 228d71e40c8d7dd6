use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use futures::{channel::oneshot, executor::block_on, ready};
use pin_project_lite::pin_project;

use crate::error::{Failure, FlowError};

pin_project! {
  /// Resolves with a collector's container once the collector finished, or
  /// with the failure it received.
  ///
  /// Resolves with [`FlowError::Abandoned`] if every handle to the collector
  /// was dropped before it finished.
  #[must_use = "futures do nothing unless you `.await` or poll them"]
  pub struct CollectFuture<C> {
    #[pin]
    receiver: oneshot::Receiver<Result<C, Failure>>,
  }
}

impl<C> CollectFuture<C> {
  /// Blocks the current thread until the future resolves.
  pub fn wait(self) -> Result<C, Failure> { block_on(self) }
}

impl<C> Future for CollectFuture<C> {
  type Output = Result<C, Failure>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match ready!(self.project().receiver.poll(cx)) {
      Ok(outcome) => Poll::Ready(outcome),
      Err(oneshot::Canceled) => Poll::Ready(Err(Failure::from(FlowError::Abandoned))),
    }
  }
}

/// Completion side of [`CollectFuture`]: remembers the outcome and hands it
/// to every future created before or after completion.
pub(crate) struct Completion<C> {
  outcome: Option<Result<C, Failure>>,
  waiters: Vec<oneshot::Sender<Result<C, Failure>>>,
}

impl<C> Completion<C> {
  pub(crate) fn new() -> Self { Completion { outcome: None, waiters: vec![] } }

  #[inline]
  pub(crate) fn is_done(&self) -> bool { self.outcome.is_some() }
}

impl<C: Clone> Completion<C> {
  /// Resolves all futures. Only the first call has an effect.
  pub(crate) fn complete(&mut self, outcome: Result<C, Failure>) {
    if self.is_done() {
      return;
    }
    for waiter in self.waiters.drain(..) {
      // The future may have been dropped already.
      let _ = waiter.send(outcome.clone());
    }
    self.outcome = Some(outcome);
  }

  pub(crate) fn future(&mut self) -> CollectFuture<C> {
    let (sender, receiver) = oneshot::channel();
    match &self.outcome {
      Some(outcome) => {
        let _ = sender.send(outcome.clone());
      }
      None => self.waiters.push(sender),
    }
    CollectFuture { receiver }
  }
}
