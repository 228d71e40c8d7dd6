//! # rxflow: backpressure-aware publish/subscribe flows
//!
//! Publishers hand items to subscribers, and subscribers decide how many
//! items they are ready for by requesting credit on their subscription. A
//! publisher never delivers more than a subscriber requested.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxflow::prelude::*;
//!
//! let publisher = ReplayablePublisher::new(3);
//! for i in 1..=4 {
//!   publisher.submit(i).unwrap();
//! }
//!
//! // Late subscribers first receive the last three distinct items.
//! let collector = FixedCollectorSubscriber::new(Vec::new(), 5);
//! publisher.subscribe_replayable(collector.clone()).unwrap();
//! publisher.submit(5).unwrap();
//! publisher.submit(6).unwrap();
//! assert_eq!(collector.future().wait().unwrap(), vec![2, 3, 4, 5, 6]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Something subscribers subscribe to |
//! | [`Subscriber`] / [`ReplayableSubscriber`] | Consumes `on_subscribe`, `on_next`, `on_error`, `on_complete` (and `replay`) |
//! | [`Subscription`] | Per-subscriber demand (`request`) and cancellation |
//! | [`SynchronousPublisher`] | Unbuffered, delivers on the submitting thread |
//! | [`BufferedPublisher`] | Bounded buffer per subscriber, delivers on an [`Executor`] |
//! | [`ReplayablePublisher`] | Buffered, replays recent distinct items |
//! | [`TransformPublisher`] / [`TransformProcessor`] | Map and filter between stages |
//! | [`CollectorSubscriber`] / [`FixedCollectorSubscriber`] | Collect items into a container |
//!
//! ## Feature Flags
//!
//! - **`tokio-executor`**: run buffered delivery on a tokio runtime handle
//!
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`ReplayableSubscriber`]: subscriber::ReplayableSubscriber
//! [`Subscription`]: subscription::Subscription
//! [`SynchronousPublisher`]: publisher::SynchronousPublisher
//! [`BufferedPublisher`]: publisher::BufferedPublisher
//! [`ReplayablePublisher`]: publisher::ReplayablePublisher
//! [`Executor`]: executor::Executor
//! [`TransformPublisher`]: transform::TransformPublisher
//! [`TransformProcessor`]: transform::TransformProcessor
//! [`CollectorSubscriber`]: collector::CollectorSubscriber
//! [`FixedCollectorSubscriber`]: collector::FixedCollectorSubscriber

pub mod cache;
pub mod collector;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod publisher;
pub mod subscriber;
pub mod subscription;
pub mod transform;

#[cfg(test)]
mod test_support;

// Re-export the prelude module
pub use prelude::*;

#[cfg(doctest)]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}
