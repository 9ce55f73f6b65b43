//! Blocking observers for [`Publisher`](crate::Publisher)s.
//!
//! A publisher pushes values from the async runtime; the subscribers here collect
//! them and let a plain thread block until the operation has terminated:
//!
//! ```no_run
//! # fn run(collection: tour::ReactiveCollection<mongodb::bson::Document>) -> tour::Result<()> {
//! use tour::ObservableSubscriber;
//!
//! let subscriber = ObservableSubscriber::operation();
//! collection.drop().subscribe(subscriber.clone());
//! subscriber.wait()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result, publisher::Subscription};
use mongodb::bson::Document;
use parking_lot::{Condvar, Mutex};
use std::{fmt::Debug, sync::Arc, time::Duration};

/// Receiver side of a [`Publisher`](crate::Publisher).
///
/// `on_subscribe` is called exactly once, before anything else. It is followed by
/// any number of `on_next` calls and at most one of `on_error` / `on_complete`.
pub trait Subscriber<T>: Send + 'static {
    fn on_subscribe(&mut self, subscription: Subscription);

    fn on_next(&mut self, item: T);

    fn on_error(&mut self, error: Error);

    fn on_complete(&mut self);
}

type Inspect<T> = Arc<dyn Fn(Event<'_, T>) + Send + Sync>;

enum Event<'a, T> {
    Next(&'a T),
    Complete(&'a [T]),
    Error(&'a Error),
}

enum Terminal {
    Complete,
    Failed(Error),
}

struct State<T> {
    subscription: Option<Subscription>,
    received: Vec<T>,
    terminal: Option<Terminal>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    terminated: Condvar,
}

/// Collects the values of one operation and exposes a blocking wait on its outcome.
///
/// Clones share the same state: hand one clone to
/// [`Publisher::subscribe`](crate::Publisher::subscribe) and keep the other to call
/// [`wait`](Self::wait) or [`first`](Self::first).
pub struct ObservableSubscriber<T> {
    shared: Arc<Shared<T>>,
    inspect: Option<Inspect<T>>,
}

impl<T> Clone for ObservableSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inspect: self.inspect.clone(),
        }
    }
}

impl<T> Debug for ObservableSubscriber<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ObservableSubscriber")
            .field("received", &state.received.len())
            .field("terminated", &state.terminal.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ObservableSubscriber<T> {
    fn with_inspect(inspect: Option<Inspect<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    subscription: None,
                    received: Vec::new(),
                    terminal: None,
                }),
                terminated: Condvar::new(),
            }),
            inspect,
        }
    }

    /// Accumulates values silently.
    pub fn operation() -> Self {
        Self::with_inspect(None)
    }

    /// Prints `template` once the operation has terminated, with the first `{}`
    /// replaced by the debug rendering of the received values. Errors are printed
    /// as they arrive.
    pub fn print(template: impl Into<String>) -> Self
    where
        T: Debug,
    {
        let template = template.into();

        Self::with_inspect(Some(Arc::new(move |event: Event<'_, T>| match event {
            Event::Next(_) => {}
            Event::Complete(received) => {
                let rendered = match received {
                    [single] => format!("{single:?}"),
                    many => format!("{many:?}"),
                };
                println!("{}", template.replacen("{}", &rendered, 1));
            }
            Event::Error(error) => println!("Operation failed: {error}"),
        })))
    }

    /// Blocks until the operation terminates and returns every received value.
    pub fn wait(self) -> Result<Vec<T>> {
        let mut state = self.shared.state.lock();
        self.shared
            .terminated
            .wait_while(&mut state, |state| state.terminal.is_none());

        Self::take_outcome(&mut state)
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// Nobody can observe the outcome after a timeout, so the subscription is
    /// cancelled before [`Error::Timeout`] is returned.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Vec<T>> {
        let mut state = self.shared.state.lock();
        let result = self.shared.terminated.wait_while_for(
            &mut state,
            |state| state.terminal.is_none(),
            timeout,
        );

        if result.timed_out() && state.terminal.is_none() {
            if let Some(subscription) = &state.subscription {
                subscription.cancel();
            }
            tracing::debug!(?timeout, "subscriber timed out, subscription cancelled");
            return Err(Error::Timeout(timeout));
        }

        Self::take_outcome(&mut state)
    }

    /// Blocks until the operation terminates and returns the first received value.
    pub fn first(self) -> Result<T> {
        self.wait()?.into_iter().next().ok_or(Error::NoResult)
    }

    pub fn first_timeout(self, timeout: Duration) -> Result<T> {
        self.wait_timeout(timeout)?
            .into_iter()
            .next()
            .ok_or(Error::NoResult)
    }

    /// Cancels the underlying subscription, if the publisher has started.
    pub fn cancel(&self) {
        if let Some(subscription) = &self.shared.state.lock().subscription {
            subscription.cancel();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminal.is_some()
    }

    pub fn received_len(&self) -> usize {
        self.shared.state.lock().received.len()
    }

    fn take_outcome(state: &mut State<T>) -> Result<Vec<T>> {
        match state.terminal.take() {
            Some(Terminal::Failed(error)) => Err(error),
            Some(Terminal::Complete) | None => Ok(std::mem::take(&mut state.received)),
        }
    }

    fn terminate(&self, terminal: Terminal) {
        let mut state = self.shared.state.lock();

        if state.terminal.is_some() {
            tracing::warn!("terminal signal received twice, ignoring");
            return;
        }

        if let Some(inspect) = &self.inspect {
            match &terminal {
                Terminal::Complete => inspect(Event::Complete(&state.received)),
                Terminal::Failed(error) => inspect(Event::Error(error)),
            }
        }

        state.terminal = Some(terminal);
        self.shared.terminated.notify_all();
    }
}

impl ObservableSubscriber<Document> {
    /// Prints every document as relaxed extended JSON as soon as it arrives.
    pub fn print_documents() -> Self {
        Self::with_inspect(Some(Arc::new(|event: Event<'_, Document>| match event {
            Event::Next(document) => {
                let json = mongodb::bson::Bson::Document(document.clone()).into_relaxed_extjson();
                println!("{json}");
            }
            Event::Complete(_) => {}
            Event::Error(error) => println!("Operation failed: {error}"),
        })))
    }
}

impl<T: Send + 'static> Subscriber<T> for ObservableSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        subscription.request(u64::MAX);
        self.shared.state.lock().subscription = Some(subscription);
    }

    fn on_next(&mut self, item: T) {
        let mut state = self.shared.state.lock();

        if state.terminal.is_some() {
            tracing::warn!("value received after terminal signal, dropping it");
            return;
        }

        if let Some(inspect) = &self.inspect {
            inspect(Event::Next(&item));
        }

        state.received.push(item);
    }

    fn on_error(&mut self, error: Error) {
        self.terminate(Terminal::Failed(error));
    }

    fn on_complete(&mut self) {
        self.terminate(Terminal::Complete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_value_then_complete() {
        let subscriber = ObservableSubscriber::operation();
        let mut producer = subscriber.clone();

        producer.on_subscribe(Subscription::new());
        producer.on_next(7);
        producer.on_complete();

        assert_eq!(subscriber.wait().unwrap(), vec![7]);
    }

    #[test]
    fn empty_completion_is_no_result_for_first() {
        let subscriber = ObservableSubscriber::<i32>::operation();
        let mut producer = subscriber.clone();

        producer.on_subscribe(Subscription::new());
        producer.on_complete();

        assert!(subscriber.first().unwrap_err().is_no_result());
    }

    #[test]
    fn error_is_returned_instead_of_partial_buffer() {
        let subscriber = ObservableSubscriber::operation();
        let mut producer = subscriber.clone();

        producer.on_subscribe(Subscription::new());
        producer.on_next(1);
        producer.on_error(Error::Evaluation("boom".into()));

        let error = subscriber.wait().unwrap_err();
        assert!(matches!(error, Error::Evaluation(message) if message == "boom"));
    }

    #[test]
    fn second_terminal_signal_is_ignored() {
        let subscriber = ObservableSubscriber::<i32>::operation();
        let mut producer = subscriber.clone();

        producer.on_subscribe(Subscription::new());
        producer.on_complete();
        producer.on_error(Error::NoResult);
        producer.on_next(3);

        assert_eq!(subscriber.wait().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn on_subscribe_requests_unbounded_demand() {
        let subscriber = ObservableSubscriber::<i32>::operation();
        let subscription = Subscription::new();

        subscriber.clone().on_subscribe(subscription.clone());

        assert!(subscription.is_unbounded());
    }

    #[test]
    fn wait_timeout_cancels_subscription() {
        let subscriber = ObservableSubscriber::<i32>::operation();
        let subscription = Subscription::new();
        subscriber.clone().on_subscribe(subscription.clone());

        let error = subscriber
            .wait_timeout(Duration::from_millis(20))
            .unwrap_err();

        assert!(error.is_timeout());
        assert!(subscription.is_cancelled());
    }

    #[test]
    fn wait_is_released_from_another_thread() {
        let subscriber = ObservableSubscriber::operation();
        let mut producer = subscriber.clone();

        let handle = thread::spawn(move || {
            producer.on_subscribe(Subscription::new());
            thread::sleep(Duration::from_millis(20));
            producer.on_next("a");
            producer.on_next("b");
            producer.on_complete();
        });

        let received = subscriber.wait_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();

        assert_eq!(received, vec!["a", "b"]);
    }

    #[test]
    fn terminal_state_is_observable_without_blocking() {
        let subscriber = ObservableSubscriber::operation();
        let mut producer = subscriber.clone();

        producer.on_subscribe(Subscription::new());
        producer.on_next(1);
        assert!(!subscriber.is_terminated());
        assert_eq!(subscriber.received_len(), 1);

        producer.on_complete();
        assert!(subscriber.is_terminated());
    }
}
