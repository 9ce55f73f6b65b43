use crate::{Result, subscriber::Subscriber};
use futures_util::{
    FutureExt, Stream, StreamExt,
    future::{self, BoxFuture},
    stream::{self, BoxStream},
};
use std::{
    fmt::Debug,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::{runtime::Handle, sync::Notify};

/// Demand and cancellation shared between a running [`Publisher`] and its [`Subscriber`].
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

#[derive(Default)]
struct SubscriptionInner {
    demand: AtomicU64,
    cancelled: AtomicBool,
    notify: Notify,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("demand", &self.inner.demand.load(Ordering::Acquire))
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `n` more values to be delivered. `u64::MAX` means unbounded.
    pub fn request(&self, n: u64) {
        if n == 0 {
            tracing::warn!("ignoring request for zero values");
            return;
        }

        let _ = self
            .inner
            .demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |demand| {
                Some(demand.saturating_add(n))
            });
        self.inner.notify.notify_one();
    }

    /// Stops delivery. No further signal reaches the subscriber.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn is_unbounded(&self) -> bool {
        self.inner.demand.load(Ordering::Acquire) == u64::MAX
    }

    /// Waits until one value may be delivered. Returns `false` once cancelled.
    async fn acquire(&self) -> bool {
        loop {
            let notified = self.inner.notify.notified();

            if self.is_cancelled() {
                return false;
            }

            let granted = self
                .inner
                .demand
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |demand| match demand {
                    0 => None,
                    u64::MAX => Some(u64::MAX),
                    demand => Some(demand - 1),
                })
                .is_ok();

            if granted {
                return true;
            }

            notified.await;
        }
    }
}

/// A single database operation exposed as a push-based stream of values.
///
/// Nothing happens until [`subscribe`](Self::subscribe) is called; the operation then
/// runs on the runtime the publisher was created with.
#[must_use = "publishers do nothing unless subscribed"]
pub struct Publisher<T> {
    runtime: Handle,
    name: &'static str,
    source: BoxStream<'static, Result<T>>,
}

impl<T> Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Publisher<T> {
    pub fn from_stream(
        runtime: Handle,
        name: &'static str,
        source: impl Stream<Item = Result<T>> + Send + 'static,
    ) -> Self {
        Self {
            runtime,
            name,
            source: source.boxed(),
        }
    }

    /// A publisher of exactly one value.
    pub fn from_future(
        runtime: Handle,
        name: &'static str,
        future: impl Future<Output = Result<T>> + Send + 'static,
    ) -> Self {
        Self::from_stream(runtime, name, stream::once(future))
    }

    /// A publisher that emits no values and only signals how the operation ended.
    pub fn from_completion(
        runtime: Handle,
        name: &'static str,
        operation: impl Future<Output = Result<()>> + Send + 'static,
    ) -> Self {
        let source =
            stream::once(operation).filter_map(|outcome| future::ready(outcome.err().map(Err)));

        Self::from_stream(runtime, name, source)
    }

    /// Limits the publisher to its first value.
    pub fn first(self) -> Self {
        Self {
            source: self.source.take(1).boxed(),
            ..self
        }
    }

    /// Starts the operation, delivering its signals to `subscriber`.
    ///
    /// `on_subscribe` runs on the calling thread before this returns, everything else
    /// on the runtime.
    pub fn subscribe<S: Subscriber<T>>(self, mut subscriber: S) {
        let Self {
            runtime,
            name,
            source,
        } = self;

        let subscription = Subscription::new();
        subscriber.on_subscribe(subscription.clone());

        runtime.spawn(drive(name, source, subscriber, subscription));
    }

    /// Runs the operation to completion from async code, bypassing demand.
    pub fn collect(self) -> BoxFuture<'static, Result<Vec<T>>> {
        async move {
            let mut source = self.source;
            let mut values = Vec::new();

            while let Some(value) = source.next().await {
                values.push(value?);
            }

            Ok(values)
        }
        .boxed()
    }
}

async fn drive<T, S: Subscriber<T>>(
    name: &'static str,
    mut source: BoxStream<'static, Result<T>>,
    mut subscriber: S,
    subscription: Subscription,
) {
    tracing::debug!(operation = name, "publisher started");

    let mut delivered = 0_u64;

    loop {
        if subscription.is_cancelled() {
            tracing::debug!(operation = name, delivered, "publisher cancelled");
            return;
        }

        match source.next().await {
            Some(Ok(item)) => {
                if !subscription.acquire().await {
                    tracing::debug!(operation = name, delivered, "publisher cancelled");
                    return;
                }
                delivered += 1;
                subscriber.on_next(item);
            }
            Some(Err(error)) => {
                tracing::debug!(operation = name, delivered, %error, "publisher failed");
                subscriber.on_error(error);
                return;
            }
            None => {
                tracing::debug!(operation = name, delivered, "publisher completed");
                subscriber.on_complete();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ObservableSubscriber};
    use std::time::Duration;
    use tokio::runtime::{Builder, Runtime};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn runtime() -> Runtime {
        Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn stream_values_arrive_in_order() {
        let rt = runtime();
        let publisher = Publisher::from_stream(
            rt.handle().clone(),
            "numbers",
            stream::iter((1..=5).map(Ok)),
        );

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(subscriber.clone());

        assert_eq!(subscriber.wait_timeout(TIMEOUT).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn completion_publisher_emits_nothing() {
        let rt = runtime();
        let publisher: Publisher<()> =
            Publisher::from_completion(rt.handle().clone(), "drop", async { Ok(()) });

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(subscriber.clone());

        assert!(subscriber.wait_timeout(TIMEOUT).unwrap().is_empty());
    }

    #[test]
    fn completion_publisher_forwards_error() {
        let rt = runtime();
        let publisher: Publisher<()> = Publisher::from_completion(rt.handle().clone(), "drop", async {
            Err(Error::Evaluation("refused".into()))
        });

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(subscriber.clone());

        assert!(matches!(
            subscriber.wait_timeout(TIMEOUT),
            Err(Error::Evaluation(_))
        ));
    }

    #[test]
    fn first_limits_to_one_value() {
        let rt = runtime();
        let publisher = Publisher::from_stream(
            rt.handle().clone(),
            "find",
            stream::iter(["a", "b", "c"].map(Ok)),
        )
        .first();

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(subscriber.clone());

        assert_eq!(subscriber.wait_timeout(TIMEOUT).unwrap(), vec!["a"]);
    }

    #[test]
    fn empty_source_completes_without_demand() {
        struct NoDemand(ObservableSubscriber<i32>);

        impl Subscriber<i32> for NoDemand {
            fn on_subscribe(&mut self, _subscription: Subscription) {}

            fn on_next(&mut self, item: i32) {
                self.0.on_next(item);
            }

            fn on_error(&mut self, error: Error) {
                self.0.on_error(error);
            }

            fn on_complete(&mut self) {
                self.0.on_complete();
            }
        }

        let rt = runtime();
        let publisher = Publisher::from_stream(rt.handle().clone(), "empty", stream::empty());

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(NoDemand(subscriber.clone()));

        assert!(subscriber.first_timeout(TIMEOUT).unwrap_err().is_no_result());
    }

    #[test]
    fn values_wait_for_demand() {
        struct Manual {
            subscription: std::sync::mpsc::Sender<Subscription>,
            inner: ObservableSubscriber<i32>,
        }

        impl Subscriber<i32> for Manual {
            fn on_subscribe(&mut self, subscription: Subscription) {
                self.subscription.send(subscription).unwrap();
            }

            fn on_next(&mut self, item: i32) {
                self.inner.on_next(item);
            }

            fn on_error(&mut self, error: Error) {
                self.inner.on_error(error);
            }

            fn on_complete(&mut self) {
                self.inner.on_complete();
            }
        }

        let rt = runtime();
        let publisher =
            Publisher::from_stream(rt.handle().clone(), "numbers", stream::iter([1, 2].map(Ok)));

        let (tx, rx) = std::sync::mpsc::channel();
        let inner = ObservableSubscriber::operation();
        publisher.subscribe(Manual {
            subscription: tx,
            inner: inner.clone(),
        });
        let subscription = rx.recv().unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(inner.received_len(), 0);

        subscription.request(1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(inner.received_len(), 1);
        assert!(!inner.is_terminated());

        subscription.request(1);
        assert_eq!(inner.wait_timeout(TIMEOUT).unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancelled_subscription_never_terminates() {
        let rt = runtime();
        let publisher = Publisher::from_stream(
            rt.handle().clone(),
            "pending",
            stream::pending::<Result<i32>>(),
        );

        let subscriber = ObservableSubscriber::operation();
        publisher.subscribe(subscriber.clone());
        subscriber.cancel();

        let error = subscriber
            .wait_timeout(Duration::from_millis(50))
            .unwrap_err();
        assert!(error.is_timeout());
    }

    #[test]
    fn collect_gathers_every_value() {
        let rt = runtime();
        let publisher =
            Publisher::from_stream(rt.handle().clone(), "numbers", stream::iter([4, 5].map(Ok)));

        assert_eq!(rt.block_on(publisher.collect()).unwrap(), vec![4, 5]);
    }
}
