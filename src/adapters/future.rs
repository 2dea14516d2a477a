//! `FutureSource<T>`: a one-shot future as a value source.
//!
//! The future is spawned on the current [`tokio::task::LocalSet`] the first
//! time anyone subscribes, so creating a `FutureSource` is free. Once the
//! future resolves, the value is pushed to every subscriber and kept for
//! later `try_deliver_current` calls.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::{FutureExt, LocalBoxFuture};
use tokio::task::JoinHandle;

use crate::error::ReactiveError;
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

struct FutureState<T> {
    /// The not-yet-started future. Taken when the task is spawned.
    pending: Option<LocalBoxFuture<'static, T>>,
    value: Option<T>,
    subscribers: SubscriberList<T>,
    task: Option<JoinHandle<()>>,
}

struct FutureInner<T> {
    id: SourceId,
    state: RefCell<FutureState<T>>,
}

impl<T> Drop for FutureInner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}

impl<T: Clone + 'static> FutureInner<T> {
    fn resolve(&self, value: T) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            state.value = Some(value.clone());
            state.task = None;
            state.subscribers.snapshot()
        };
        tracing::trace!(source = %self.id, subscribers = subscribers.len(), "future resolved");
        broadcast(&subscribers, &value, "future");
    }
}

/// A one-shot future exposed through the subscription contract.
///
/// Must be subscribed from within a `LocalSet`.
pub struct FutureSource<T> {
    inner: Rc<FutureInner<T>>,
}

impl<T> Clone for FutureSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FutureSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("FutureSource")
            .field("id", &self.inner.id)
            .field("started", &state.pending.is_none())
            .field("value", &state.value)
            .finish()
    }
}

impl<T: Clone + 'static> FutureSource<T> {
    /// Wrap a future. Nothing runs until the first subscribe.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + 'static,
    {
        Self::from_state(Some(future.boxed_local()), None)
    }

    /// A source that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        Self::from_state(None, Some(value))
    }

    fn from_state(pending: Option<LocalBoxFuture<'static, T>>, value: Option<T>) -> Self {
        Self {
            inner: Rc::new(FutureInner {
                id: SourceId::next(),
                state: RefCell::new(FutureState {
                    pending,
                    value,
                    subscribers: SubscriberList::new(),
                    task: None,
                }),
            }),
        }
    }

    /// Whether the future has produced its value.
    pub fn is_resolved(&self) -> bool {
        self.inner.state.borrow().value.is_some()
    }

    /// The resolved value, if any.
    pub fn value(&self) -> Option<T> {
        self.inner.state.borrow().value.clone()
    }

    fn start(&self) {
        let Some(future) = self.inner.state.borrow_mut().pending.take() else {
            return;
        };
        let weak: Weak<FutureInner<T>> = Rc::downgrade(&self.inner);
        let task = tokio::task::spawn_local(async move {
            let value = future.await;
            if let Some(inner) = weak.upgrade() {
                inner.resolve(value);
            }
        });
        self.inner.state.borrow_mut().task = Some(task);
    }
}

impl<T: Clone + 'static> Subscribable for FutureSource<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn subscribe(&self, on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        let token = self.inner.state.borrow_mut().subscribers.insert(on_next);
        self.start();
        Ok(token)
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, on_next: &dyn Fn(T)) -> bool {
        match self.value() {
            Some(value) => {
                on_next(value);
                true
            }
            None => false,
        }
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
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn does_not_start_before_subscribe() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let started = Rc::new(std::cell::Cell::new(false));
                let started_c = started.clone();
                let source = FutureSource::new(async move {
                    started_c.set(true);
                    1
                });
                tokio::task::yield_now().await;
                assert!(!started.get());
                assert!(!source.is_resolved());
            })
            .await;
    }

    #[tokio::test]
    async fn delivers_once_resolved() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (tx, rx) = oneshot::channel::<i32>();
                let source = FutureSource::new(async move { rx.await.unwrap_or(-1) });
                let recorder = Recorder::new();
                let token = source.subscribe(recorder.callback()).unwrap();
                assert!(!source.try_deliver_current(token, &|_| {}));

                tx.send(9).unwrap();
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
                assert_eq!(recorder.values(), vec![9]);
                assert_eq!(source.value(), Some(9));
                assert!(source.try_deliver_current(token, &|v| assert_eq!(v, 9)));
            })
            .await;
    }

    #[test]
    fn ready_source_delivers_immediately() {
        let source = FutureSource::ready("done");
        let token = source.listen(|_| {}).unwrap();
        let recorder = Recorder::new();
        let cb = recorder.callback();
        assert!(source.try_deliver_current(token, &move |v| cb(v)));
        assert_eq!(recorder.values(), vec!["done"]);
    }

    #[tokio::test]
    async fn unsubscribed_listener_misses_value() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (tx, rx) = oneshot::channel::<i32>();
                let source = FutureSource::new(async move { rx.await.unwrap_or(-1) });
                let recorder = Recorder::new();
                let token = source.subscribe(recorder.callback()).unwrap();
                source.unsubscribe(token);
                tx.send(1).unwrap();
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
                assert!(recorder.values().is_empty());
                assert!(source.is_resolved());
            })
            .await;
    }
}
