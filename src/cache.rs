//! Bounded, insertion-ordered, deduplicating FIFO cache.

use std::{
  collections::{HashSet, VecDeque},
  fmt::{Debug, Formatter},
  hash::Hash,
};

/// Keeps the last `capacity` distinct items in insertion order.
///
/// Adding an item that is already cached is a no-op and does not refresh its
/// position. Adding a new item at capacity evicts the oldest one.
///
/// ```rust
/// use rxflow::cache::BoundedDedupCache;
///
/// let mut cache = BoundedDedupCache::new(3);
/// for i in [1, 2, 2, 3, 4] {
///   cache.add(i);
/// }
/// assert_eq!(cache.iter().copied().collect::<Vec<_>>(), [2, 3, 4]);
/// assert!(!cache.add(3));
/// ```
#[derive(Clone)]
pub struct BoundedDedupCache<T> {
  capacity: usize,
  order: VecDeque<T>,
  seen: HashSet<T>,
}

impl<T> BoundedDedupCache<T>
where
  T: Eq + Hash + Clone,
{
  pub fn new(capacity: usize) -> Self {
    BoundedDedupCache {
      capacity,
      order: VecDeque::with_capacity(capacity),
      seen: HashSet::with_capacity(capacity),
    }
  }

  /// Adds `item`. Returns `false` if it was already cached.
  ///
  /// With a capacity of zero nothing is stored and every item counts as new.
  pub fn add(&mut self, item: T) -> bool {
    if self.seen.contains(&item) {
      return false;
    }
    if self.capacity == 0 {
      return true;
    }
    if self.order.len() == self.capacity {
      if let Some(eldest) = self.order.pop_front() {
        self.seen.remove(&eldest);
      }
    }
    self.seen.insert(item.clone());
    self.order.push_back(item);
    true
  }

  #[inline]
  pub fn contains(&self, item: &T) -> bool { self.seen.contains(item) }

  /// Removes `item`. Returns `false` if it was not cached.
  pub fn remove(&mut self, item: &T) -> bool {
    if !self.seen.remove(item) {
      return false;
    }
    if let Some(pos) = self.order.iter().position(|v| v == item) {
      self.order.remove(pos);
    }
    true
  }

  /// Items from oldest to newest.
  #[inline]
  pub fn iter(&self) -> impl Iterator<Item = &T> + '_ { self.order.iter() }

  /// Copies the items, oldest first.
  pub fn to_vec(&self) -> Vec<T> { self.order.iter().cloned().collect() }

  pub fn clear(&mut self) {
    self.order.clear();
    self.seen.clear();
  }
}

impl<T> BoundedDedupCache<T> {
  #[inline]
  pub fn len(&self) -> usize { self.order.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.order.is_empty() }

  #[inline]
  pub fn capacity(&self) -> usize { self.capacity }
}

impl<T: Debug> Debug for BoundedDedupCache<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_list().entries(self.order.iter()).finish()
  }
}
