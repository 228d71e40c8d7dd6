use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FlowError;

/// Lock-free credit counter.
///
/// `request` and delivery may race: a subscriber can grant credit from any
/// thread while a publisher is consuming it. Additions saturate at
/// `u64::MAX`, which callers may treat as unbounded demand.
#[derive(Debug, Default)]
pub struct Demand(AtomicU64);

impl Demand {
  pub fn new() -> Self { Self::default() }

  /// Adds `n` credits and returns the new total.
  pub fn add(&self, n: u64) -> Result<u64, FlowError> {
    if n == 0 {
      return Err(FlowError::NonPositiveRequest);
    }
    let prev = self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_add(n)))
      .unwrap_or_else(|d| d);
    Ok(prev.saturating_add(n))
  }

  /// Consumes one credit if any is outstanding.
  #[inline]
  pub fn try_take(&self) -> bool {
    self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1))
      .is_ok()
  }

  #[inline]
  pub fn get(&self) -> u64 { self.0.load(Ordering::Acquire) }

  #[inline]
  pub fn is_positive(&self) -> bool { self.get() > 0 }
}
