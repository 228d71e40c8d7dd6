use parking_lot::{Condvar, Mutex};

/// Wake-up signal for threads blocked in `submit`.
///
/// Every event that may let a blocked submitter make progress (a new
/// subscriber, new demand, closing) bumps a generation counter. A submitter
/// remembers the generation before scanning and only sleeps while it is
/// unchanged, so an event racing with the scan is never lost.
#[derive(Debug, Default)]
pub(crate) struct Signal {
  generation: Mutex<u64>,
  cond: Condvar,
}

impl Signal {
  pub(crate) fn new() -> Self { Self::default() }

  pub(crate) fn generation(&self) -> u64 { *self.generation.lock() }

  pub(crate) fn notify(&self) {
    let mut generation = self.generation.lock();
    *generation = generation.wrapping_add(1);
    self.cond.notify_all();
  }

  /// Blocks until the generation differs from `seen`.
  pub(crate) fn wait_for_change(&self, seen: u64) {
    let mut generation = self.generation.lock();
    while *generation == seen {
      self.cond.wait(&mut generation);
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use super::*;

  #[test]
  fn stale_generation_returns_immediately() {
    let signal = Signal::new();
    let seen = signal.generation();
    signal.notify();
    signal.wait_for_change(seen);
  }

  #[test]
  fn notify_wakes_waiter() {
    let signal = Arc::new(Signal::new());
    let seen = signal.generation();
    let c_signal = signal.clone();
    let waiter = thread::spawn(move || c_signal.wait_for_change(seen));
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());
    signal.notify();
    waiter.join().unwrap();
  }
}
