//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

// Cache
pub use crate::cache::BoundedDedupCache;
// Collectors
pub use crate::collector::{CollectFuture, CollectorSubscriber, FixedCollectorSubscriber};
// Errors
pub use crate::error::{Failure, FlowError};
// Executors
pub use crate::executor::{default_executor, Executor, SameThreadExecutor, SharedExecutor};
// Publishers
pub use crate::publisher::{
  BufferedPublisher, Publisher, ReplayablePublisher, SynchronousPublisher,
  DEFAULT_BUFFER_CAPACITY,
};
// Subscribers
pub use crate::subscriber::{BoxedSubscriber, FnSubscriber, ReplayableSubscriber, Subscriber};
// Subscription
pub use crate::subscription::{Subscription, SubscriptionCell, SubscriptionGuard, SubscriptionLike};
// Transform stages
pub use crate::transform::{
  PublisherExt, StageState, TransformProcessor, TransformPublisher, TransformSubscriber,
};
