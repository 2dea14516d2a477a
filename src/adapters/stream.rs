//! `StreamSource<T>`: a multi-value stream as a value source.
//!
//! The stream is driven by a local task spawned on first subscribe. Every
//! `Ok` item becomes the current value and is pushed to subscribers; the
//! first `Err` cancels the stream. When the last subscriber leaves, the task
//! is stopped but the stream is kept, and the next subscribe resumes polling
//! it where it left off. A stream that ended or failed is never restarted.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::future;
use futures::stream::{LocalBoxStream, Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::ReactiveError;
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

/// Lifecycle of the underlying stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Not yet subscribed; the stream has not been polled.
    Idle,
    /// A task is driving the stream.
    Running,
    /// Every subscriber left; polling resumes on the next subscribe.
    Paused,
    /// The stream ended normally.
    Done,
    /// The stream yielded an error and was cancelled.
    Failed(String),
}

struct StreamState<T> {
    latest: Option<T>,
    status: StreamStatus,
    subscribers: SubscriberList<T>,
    task: Option<JoinHandle<()>>,
    /// Bumped whenever a driving task is started or stopped.
    run: u64,
}

struct StreamInner<T> {
    id: SourceId,
    /// Dropped for good once the stream ends or fails.
    stream: RefCell<Option<LocalBoxStream<'static, Result<T, String>>>>,
    state: RefCell<StreamState<T>>,
}

impl<T> Drop for StreamInner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().task.take() {
            task.abort();
        }
    }
}

impl<T: Clone + 'static> StreamInner<T> {
    fn is_current(&self, run: u64) -> bool {
        self.state.borrow().run == run
    }

    fn poll_item(&self, cx: &mut Context<'_>) -> Poll<Option<Result<T, String>>> {
        match self.stream.borrow_mut().as_mut() {
            Some(stream) => stream.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }

    fn emit(&self, value: T) {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            state.latest = Some(value.clone());
            state.subscribers.snapshot()
        };
        broadcast(&subscribers, &value, "stream");
    }

    fn finish(&self, status: StreamStatus) {
        self.stream.borrow_mut().take();
        let mut state = self.state.borrow_mut();
        state.status = status;
        state.task = None;
    }
}

/// A multi-value stream exposed through the subscription contract.
///
/// Must be subscribed from within a `LocalSet`.
pub struct StreamSource<T> {
    inner: Rc<StreamInner<T>>,
}

impl<T> Clone for StreamSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StreamSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("StreamSource")
            .field("id", &self.inner.id)
            .field("status", &state.status)
            .field("latest", &state.latest)
            .finish()
    }
}

impl<T: Clone + 'static> StreamSource<T> {
    /// Wrap a fallible stream. Nothing is polled until the first subscribe.
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + 'static,
        E: fmt::Display + 'static,
    {
        let stream = stream
            .map(|item| item.map_err(|err| err.to_string()))
            .boxed_local();
        Self {
            inner: Rc::new(StreamInner {
                id: SourceId::next(),
                stream: RefCell::new(Some(stream)),
                state: RefCell::new(StreamState {
                    latest: None,
                    status: StreamStatus::Idle,
                    subscribers: SubscriberList::new(),
                    task: None,
                    run: 0,
                }),
            }),
        }
    }

    /// Wrap an infallible stream.
    pub fn infallible<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + 'static,
    {
        Self::new(stream.map(Ok::<T, std::convert::Infallible>))
    }

    /// The most recent value, if any.
    pub fn latest(&self) -> Option<T> {
        self.inner.state.borrow().latest.clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> StreamStatus {
        self.inner.state.borrow().status.clone()
    }

    fn start(&self) {
        if self.inner.stream.borrow().is_none() {
            return;
        }
        let run = {
            let mut state = self.inner.state.borrow_mut();
            if state.task.is_some() {
                return;
            }
            state.run += 1;
            state.run
        };
        let weak: Weak<StreamInner<T>> = Rc::downgrade(&self.inner);
        let id = self.inner.id;
        let task = tokio::task::spawn_local(async move {
            loop {
                let item = future::poll_fn(|cx| match weak.upgrade() {
                    Some(inner) if inner.is_current(run) => inner.poll_item(cx).map(Some),
                    _ => Poll::Ready(None),
                })
                .await;
                // Stopped or dropped while waiting.
                let Some(item) = item else {
                    return;
                };
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match item {
                    Some(Ok(value)) => inner.emit(value),
                    Some(Err(err)) => {
                        tracing::warn!(source = %id, error = %err, "stream failed; cancelling");
                        inner.finish(StreamStatus::Failed(err));
                        return;
                    }
                    None => {
                        inner.finish(StreamStatus::Done);
                        return;
                    }
                }
            }
        });
        let mut state = self.inner.state.borrow_mut();
        state.status = StreamStatus::Running;
        state.task = Some(task);
    }
}

impl<T: Clone + 'static> Subscribable for StreamSource<T> {
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
        match self.latest() {
            Some(value) => {
                on_next(value);
                true
            }
            None => false,
        }
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let mut state = self.inner.state.borrow_mut();
        if state.subscribers.remove(token) && state.subscribers.is_empty() {
            if let Some(task) = state.task.take() {
                task.abort();
                state.run += 1;
                state.status = StreamStatus::Paused;
            }
        }
    }
}
