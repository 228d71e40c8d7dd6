//! Terminal subscribers collecting items into a container.
//!
//! Both collectors accept any container implementing `Extend<T> + Clone`
//! (`Vec`, `VecDeque`, `BTreeSet`, `String` for chars, ...), request items one
//! at a time, and expose their result as a [`CollectFuture`]. Both can be
//! pre-filled by a [`ReplayablePublisher`](crate::publisher::ReplayablePublisher).

mod collect_future;
mod collector_subscriber;
mod fixed_collector;

pub use collect_future::CollectFuture;
pub(crate) use collect_future::Completion;
pub use collector_subscriber::CollectorSubscriber;
pub use fixed_collector::FixedCollectorSubscriber;
