use smallvec::SmallVec;

/// Registration list of a publisher, in subscribe order.
///
/// Delivery walks the list front to back, so subscribe order is delivery
/// order. Cancelled registrations are pruned with [`Registry::retain`] by the
/// owning publisher; nothing is removed individually.
///
/// Callbacks must not run while the owning lock is held, so publishers take a
/// [`Registry::snapshot`] and deliver after unlocking.
///
/// ```rust
/// use rxflow::subscription::Registry;
///
/// let mut registry = Registry::new();
/// registry.add("first");
/// registry.add("second");
/// registry.retain(|name| *name != "first");
/// assert_eq!(registry.snapshot().as_slice(), &["second"]);
/// ```
pub struct Registry<U> {
  entries: SmallVec<[U; 4]>,
}

impl<U> Default for Registry<U> {
  fn default() -> Self { Self { entries: SmallVec::new() } }
}

impl<U> Registry<U> {
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Appends a registration after all existing ones.
  #[inline]
  pub fn add(&mut self, entry: U) { self.entries.push(entry); }

  /// Drops every registration for which `keep` returns false.
  pub fn retain(&mut self, mut keep: impl FnMut(&U) -> bool) { self.entries.retain(|e| keep(e)); }

  #[inline]
  pub fn len(&self) -> usize { self.entries.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Empties the list, yielding registrations in subscribe order.
  pub fn drain(&mut self) -> impl Iterator<Item = U> + '_ { self.entries.drain(..) }

  pub fn iter(&self) -> impl Iterator<Item = &U> { self.entries.iter() }
}

impl<U: Clone> Registry<U> {
  pub fn snapshot(&self) -> SmallVec<[U; 4]> { self.entries.clone() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keeps_subscribe_order() {
    let mut registry = Registry::new();
    (0..6).for_each(|i| registry.add(i));
    assert_eq!(registry.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);

    registry.retain(|i| i % 2 == 0);
    assert_eq!(registry.snapshot().as_slice(), &[0, 2, 4]);
    assert_eq!(registry.len(), 3);
  }

  #[test]
  fn snapshot_is_detached() {
    let mut registry = Registry::new();
    registry.add(1);
    let snapshot = registry.snapshot();
    registry.add(2);
    assert_eq!(snapshot.len(), 1);
  }

  #[test]
  fn drain_empties() {
    let mut registry = Registry::new();
    registry.add("a");
    registry.add("b");
    assert_eq!(registry.drain().collect::<Vec<_>>(), vec!["a", "b"]);
    assert!(registry.is_empty());
  }
}
