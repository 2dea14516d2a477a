//! `Retriable<T>`: a replace-on-retry asynchronous operation.
//!
//! Each [`retry`](Retriable::retry) starts a fresh attempt and makes it the
//! current one. Only the current attempt's outcome reaches subscribers; an
//! attempt superseded before it settles is discarded. Nothing is replayed to
//! late subscribers.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::task::JoinHandle;

use crate::error::ReactiveError;
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

type Thunk<T> = Box<dyn Fn() -> LocalBoxFuture<'static, T>>;

struct RetriableState<T> {
    /// Id of the attempt whose outcome will be broadcast, if one is in flight.
    current: Option<u64>,
    next_attempt: u64,
    subscribers: SubscriberList<T>,
}

struct RetriableInner<T> {
    id: SourceId,
    label: Option<String>,
    thunk: Thunk<T>,
    state: RefCell<RetriableState<T>>,
}

impl<T: Clone + 'static> RetriableInner<T> {
    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("retriable")
    }

    fn settle(&self, attempt: u64, value: T) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if state.current != Some(attempt) {
                None
            } else {
                state.current = None;
                Some(state.subscribers.snapshot())
            }
        };
        match subscribers {
            Some(subscribers) => {
                tracing::trace!(
                    retriable = self.label(),
                    attempt,
                    subscribers = subscribers.len(),
                    "attempt settled"
                );
                broadcast(&subscribers, &value, self.label());
            }
            None => {
                tracing::debug!(retriable = self.label(), attempt, "superseded attempt discarded");
            }
        }
    }
}

/// An asynchronous operation that can be restarted, exposing only the
/// outcome of its latest attempt.
///
/// `retry` must be called from within a `LocalSet`.
pub struct Retriable<T> {
    inner: Rc<RetriableInner<T>>,
}

impl<T> Clone for Retriable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Retriable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Retriable")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("current", &state.current)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

/// Create a retriable. Shorthand for [`Retriable::new`].
pub fn new_retriable<T, F, Fut>(thunk: F) -> Retriable<T>
where
    T: Clone + 'static,
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = T> + 'static,
{
    Retriable::new(thunk)
}

/// Start a new attempt of `retriable`. Shorthand for [`Retriable::retry`].
pub fn retry<T: Clone + 'static>(retriable: &Retriable<T>) -> JoinHandle<()> {
    retriable.retry()
}

impl<T: Clone + 'static> Retriable<T> {
    /// Wrap `thunk`. Nothing runs until the first [`retry`](Self::retry).
    pub fn new<F, Fut>(thunk: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = T> + 'static,
    {
        Self::build(None, thunk)
    }

    /// Like [`new`](Self::new), with a label attached to log output.
    pub fn with_label<F, Fut>(label: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = T> + 'static,
    {
        Self::build(Some(label.into()), thunk)
    }

    fn build<F, Fut>(label: Option<String>, thunk: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = T> + 'static,
    {
        Self {
            inner: Rc::new(RetriableInner {
                id: SourceId::next(),
                label,
                thunk: Box::new(move || thunk().boxed_local()),
                state: RefCell::new(RetriableState {
                    current: None,
                    next_attempt: 0,
                    subscribers: SubscriberList::new(),
                }),
            }),
        }
    }

    /// Invoke the thunk and make its future the current attempt, superseding
    /// any attempt still in flight.
    ///
    /// The returned handle completes once the attempt has settled (and, if
    /// still current, been broadcast).
    pub fn retry(&self) -> JoinHandle<()> {
        let future = (self.inner.thunk)();
        let attempt = {
            let mut state = self.inner.state.borrow_mut();
            let attempt = state.next_attempt;
            state.next_attempt += 1;
            state.current = Some(attempt);
            attempt
        };
        tracing::trace!(retriable = self.inner.label(), attempt, "attempt started");

        let inner = Rc::clone(&self.inner);
        tokio::task::spawn_local(async move {
            let value = future.await;
            inner.settle(attempt, value);
        })
    }

    /// Whether an attempt is in flight and has not been superseded by a settle.
    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().current.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.borrow().subscribers.len()
    }
}

impl<T: Clone + 'static> Subscribable for Retriable<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn subscribe(&self, on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        Ok(self.inner.state.borrow_mut().subscribers.insert(on_next))
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, _on_next: &dyn Fn(T)) -> bool {
        false
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner.state.borrow_mut().subscribers.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribable::SubscribableExt;
    use crate::testing::Recorder;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    /// A retriable whose attempts resolve when the test sends on the
    /// matching channel, in the order the attempts were started.
    fn channel_retriable() -> (Retriable<i32>, Rc<RefCell<Vec<oneshot::Sender<i32>>>>) {
        let senders = Rc::new(RefCell::new(Vec::new()));
        let senders_c = senders.clone();
        let retriable = Retriable::new(move || {
            let (tx, rx) = oneshot::channel();
            senders_c.borrow_mut().push(tx);
            async move { rx.await.unwrap_or(-1) }
        });
        (retriable, senders)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn subscribing_does_not_run_thunk() {
        let calls = Rc::new(Cell::new(0));
        let calls_c = calls.clone();
        let retriable = new_retriable(move || {
            calls_c.set(calls_c.get() + 1);
            async { 1 }
        });
        let token = retriable.listen(|_| {}).unwrap();
        assert_eq!(calls.get(), 0);
        assert!(!retriable.try_deliver_current(token, &|_| {}));
        assert!(!retriable.is_pending());
    }

    #[tokio::test]
    async fn broadcasts_settled_attempt() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (retriable, senders) = channel_retriable();
                let recorder = Recorder::new();
                retriable.subscribe(recorder.callback()).unwrap();

                let handle = retry(&retriable);
                assert!(retriable.is_pending());
                let tx = senders.borrow_mut().remove(0);
                tx.send(7).unwrap();
                handle.await.unwrap();

                assert_eq!(recorder.values(), vec![7]);
                assert!(!retriable.is_pending());
            })
            .await;
    }

    #[tokio::test]
    async fn only_latest_attempt_is_observed() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (retriable, senders) = channel_retriable();
                let recorder = Recorder::new();
                retriable.subscribe(recorder.callback()).unwrap();

                let first = retriable.retry();
                let second = retriable.retry();
                let (tx1, tx2) = {
                    let mut senders = senders.borrow_mut();
                    let tx2 = senders.remove(1);
                    (senders.remove(0), tx2)
                };

                tx2.send(2).unwrap();
                second.await.unwrap();
                tx1.send(1).unwrap();
                first.await.unwrap();

                assert_eq!(recorder.values(), vec![2]);
            })
            .await;
    }

    #[tokio::test]
    async fn superseded_attempt_settling_first_is_discarded() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (retriable, senders) = channel_retriable();
                let recorder = Recorder::new();
                retriable.subscribe(recorder.callback()).unwrap();

                let first = retriable.retry();
                let second = retriable.retry();
                let tx1 = senders.borrow_mut().remove(0);
                tx1.send(1).unwrap();
                first.await.unwrap();
                assert!(recorder.is_empty());
                assert!(retriable.is_pending());

                let tx2 = senders.borrow_mut().remove(0);
                tx2.send(2).unwrap();
                second.await.unwrap();
                assert_eq!(recorder.values(), vec![2]);
            })
            .await;
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_skipped() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let retriable = Retriable::with_label("fetch", || async { "ok" });
                let kept = Recorder::new();
                let dropped = Recorder::new();
                retriable.subscribe(kept.callback()).unwrap();
                let token = retriable.subscribe(dropped.callback()).unwrap();
                retriable.unsubscribe(token);
                assert_eq!(retriable.subscriber_count(), 1);

                retriable.retry().await.unwrap();
                assert_eq!(kept.values(), vec!["ok"]);
                assert!(dropped.is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let retriable = Retriable::new(|| async { 5 });
                retriable.listen(|_| panic!("subscriber blew up")).unwrap();
                let recorder = Recorder::new();
                retriable.subscribe(recorder.callback()).unwrap();

                let outcome = retriable.retry().await;
                assert!(outcome.is_ok());
                assert_eq!(recorder.values(), vec![5]);
                settle().await;
            })
            .await;
    }

    #[tokio::test]
    async fn retry_after_settle_runs_again() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let calls_c = calls.clone();
                let retriable = Retriable::new(move || {
                    calls_c.set(calls_c.get() + 1);
                    let n = calls_c.get();
                    async move { n }
                });
                let recorder = Recorder::new();
                retriable.subscribe(recorder.callback()).unwrap();
                retriable.retry().await.unwrap();
                retriable.retry().await.unwrap();
                assert_eq!(recorder.values(), vec![1, 2]);
                assert_eq!(calls.get(), 2);
            })
            .await;
    }
}
