use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

use super::TransformSubscriber;
use crate::{
  error::{Failure, FlowError},
  publisher::Publisher,
  subscriber::BoxedSubscriber,
};

type TransformFn<T, R> = dyn Fn(T) -> Result<Option<R>, Failure> + Send + Sync;

/// Publisher of `R` over a publisher of `T`.
///
/// Subscribing to a `TransformPublisher` subscribes a
/// [`TransformSubscriber`] to the upstream publisher; each subscriber has its
/// own upstream subscription. The transform is shared by all of them.
pub struct TransformPublisher<P, T, R> {
  upstream: P,
  transform: Arc<TransformFn<T, R>>,
}

impl<P, T, R> TransformPublisher<P, T, R> {
  pub fn new<F>(upstream: P, transform: F) -> Self
  where
    F: Fn(T) -> Result<Option<R>, Failure> + Send + Sync + 'static,
  {
    TransformPublisher { upstream, transform: Arc::new(transform) }
  }

  /// Transform publisher for a function that cannot fail. `None` drops the
  /// item.
  pub fn filter_map<F>(upstream: P, f: F) -> Self
  where
    F: Fn(T) -> Option<R> + Send + Sync + 'static,
  {
    Self::new(upstream, move |v| Ok(f(v)))
  }

  pub fn upstream(&self) -> &P { &self.upstream }
}

impl<P, T, R> Publisher<R> for TransformPublisher<P, T, R>
where
  P: Publisher<T>,
  T: 'static,
  R: 'static,
{
  fn subscribe_boxed(&self, subscriber: BoxedSubscriber<R>) -> Result<(), FlowError> {
    let transform = self.transform.clone();
    self
      .upstream
      .subscribe(TransformSubscriber::new(subscriber, move |v: T| transform(v)))
  }
}

impl<P: Clone, T, R> Clone for TransformPublisher<P, T, R> {
  fn clone(&self) -> Self {
    TransformPublisher { upstream: self.upstream.clone(), transform: self.transform.clone() }
  }
}

impl<P: Debug, T, R> Debug for TransformPublisher<P, T, R> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransformPublisher")
      .field("upstream", &self.upstream)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread, time::Duration};

  use futures::executor::{block_on, ThreadPool};

  use super::*;
  use crate::{
    collector::{CollectorSubscriber, FixedCollectorSubscriber},
    publisher::{BufferedPublisher, SynchronousPublisher},
    test_support::{wait_until, Event, Recorder},
    transform::PublisherExt,
  };

  #[test]
  fn transforms_buffered_items() {
    let pool = Arc::new(ThreadPool::builder().pool_size(1).create().unwrap());
    let publisher = BufferedPublisher::with_executor(pool, 10);
    let strings = TransformPublisher::new(publisher.clone(), |v: i32| Ok(Some(v.to_string())));
    let collector = FixedCollectorSubscriber::new(Vec::new(), 5);
    let future = collector.future();
    strings.subscribe(collector).unwrap();

    for i in 0..5 {
      publisher.submit(i).unwrap();
    }
    assert_eq!(block_on(future).unwrap(), vec!["0", "1", "2", "3", "4"]);
  }

  #[test]
  fn transform_error_reaches_subscriber() {
    let pool = Arc::new(ThreadPool::builder().pool_size(1).create().unwrap());
    let publisher = BufferedPublisher::with_executor(pool, 10);
    let failing =
      publisher
        .clone()
        .transform(|_: i32| -> Result<Option<String>, Failure> { Err(Failure::msg("test")) });
    let recorder = Recorder::new(1);
    failing.subscribe(recorder.clone()).unwrap();

    publisher.submit(12).unwrap();
    assert!(wait_until(Duration::from_secs(5), || recorder.is_terminated()));
    assert_eq!(recorder.events(), vec![Event::Error("test".to_owned())]);
    assert_eq!(publisher.subscriber_count(), 0);
  }

  #[test]
  fn same_thread_delivery_keeps_order() {
    let publisher = BufferedPublisher::same_thread();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 500);
    let future = collector.future();
    publisher
      .clone()
      .map(|v: i32| v.to_string())
      .subscribe(collector)
      .unwrap();
    for i in 0..500 {
      publisher.submit(i).unwrap();
    }
    let expected: Vec<String> = (0..500).map(|i| i.to_string()).collect();
    assert_eq!(block_on(future).unwrap(), expected);
  }

  #[test]
  fn synchronous_upstream_stops_at_collector_limit() {
    let publisher = SynchronousPublisher::new();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 23);
    let future = collector.future();
    publisher
      .clone()
      .map(|v: i32| v.to_string())
      .subscribe(collector)
      .unwrap();

    let producer = publisher.clone();
    let handle = thread::spawn(move || {
      for i in 0..55 {
        if producer.submit(i).is_err() {
          break;
        }
      }
    });
    let expected: Vec<String> = (0..23).map(|i| i.to_string()).collect();
    assert_eq!(block_on(future).unwrap(), expected);

    // The producer is stuck on item 23 until the publisher closes.
    publisher.close();
    handle.join().unwrap();
  }

  #[test]
  fn synchronous_upstream_delivers_everything_requested() {
    let publisher = SynchronousPublisher::new();
    let collector = FixedCollectorSubscriber::new(Vec::new(), 55);
    let future = collector.future();
    publisher
      .clone()
      .map(|v: i32| v.to_string())
      .subscribe(collector)
      .unwrap();
    for i in 0..55 {
      publisher.submit(i).unwrap();
    }
    let expected: Vec<String> = (0..55).map(|i| i.to_string()).collect();
    assert_eq!(block_on(future).unwrap(), expected);
  }

  #[test]
  fn filtered_items_are_replaced_upstream() {
    let publisher = SynchronousPublisher::new();
    let collector = CollectorSubscriber::new(Vec::new());
    let future = collector.future();
    publisher
      .clone()
      .filter(|v: &i32| v % 3 == 0)
      .subscribe(collector)
      .unwrap();
    // A collector requests one item at a time; without the replacement
    // request the second submit would block forever.
    for i in 0..10 {
      publisher.submit(i).unwrap();
    }
    publisher.close();
    assert_eq!(block_on(future).unwrap(), vec![0, 3, 6, 9]);
  }

  #[test]
  fn each_subscriber_gets_its_own_stage() {
    let publisher = BufferedPublisher::same_thread();
    let doubled = TransformPublisher::filter_map(publisher.clone(), |v: i32| Some(v * 2));
    let a = Recorder::new(10);
    let b = Recorder::new(10);
    doubled.subscribe(a.clone()).unwrap();
    doubled.clone().subscribe(b.clone()).unwrap();
    assert_eq!(publisher.subscriber_count(), 2);

    publisher.submit(1).unwrap();
    b.subscription().cancel();
    publisher.submit(2).unwrap();
    assert_eq!(a.items(), vec![2, 4]);
    assert_eq!(b.items(), vec![2]);
  }
}
