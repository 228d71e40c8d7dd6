//! Executors run the delivery tasks of buffered publishers.
//!
//! A [`BufferedPublisher`](crate::publisher::BufferedPublisher) never calls
//! subscribers on the submitting thread; it hands a drain task to an
//! [`Executor`]. Three executors are provided:
//!
//! - [`SameThreadExecutor`] runs the task inline, on whatever thread scheduled
//!   it.
//! - `futures::executor::ThreadPool` runs it on a pool thread.
//! - `tokio::runtime::Handle` (feature `tokio-executor`) runs it on tokio's
//!   blocking pool.
//!
//! [`default_executor`] returns a lazily created, process-wide thread pool.

use std::sync::Arc;

use futures::{executor::ThreadPool, future};
use once_cell::sync::Lazy;
use tracing::error;

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, possibly on another thread.
pub trait Executor: Send + Sync {
  fn execute(&self, task: Task);
}

/// Shared executor handle.
pub type SharedExecutor = Arc<dyn Executor>;

impl<E: Executor + ?Sized> Executor for Arc<E> {
  #[inline]
  fn execute(&self, task: Task) { (**self).execute(task) }
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SameThreadExecutor;

impl Executor for SameThreadExecutor {
  #[inline]
  fn execute(&self, task: Task) { task() }
}

impl Executor for ThreadPool {
  fn execute(&self, task: Task) { self.spawn_ok(future::lazy(move |_| task())); }
}

#[cfg(feature = "tokio-executor")]
impl Executor for tokio::runtime::Handle {
  fn execute(&self, task: Task) {
    // Delivery tasks call user code that may block, keep them off the async
    // worker threads.
    drop(self.spawn_blocking(task));
  }
}

static DEFAULT_POOL: Lazy<Option<SharedExecutor>> = Lazy::new(|| match ThreadPool::new() {
  Ok(pool) => Some(Arc::new(pool) as SharedExecutor),
  Err(err) => {
    error!(%err, "failed to start the default delivery pool, delivering on the caller thread");
    None
  }
});

/// The process-wide default executor: a `futures` thread pool created on
/// first use. If the pool cannot be started, tasks run on the caller thread.
pub fn default_executor() -> SharedExecutor {
  match DEFAULT_POOL.as_ref() {
    Some(pool) => pool.clone(),
    None => Arc::new(SameThreadExecutor),
  }
}
