//! `Observable<T>`: a mutable value with watchers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

struct ObservableState<T> {
    value: T,
    watchers: SubscriberList<T>,
}

struct ObservableInner<T> {
    id: SourceId,
    state: RefCell<ObservableState<T>>,
}

/// A shared mutable value that notifies its watchers on every write.
///
/// Cloning creates a new handle to the **same** value. Every `set` notifies,
/// even when the new value equals the old one; deduplication is the job of
/// the nodes downstream.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("value", &state.value)
            .field("watchers", &state.watchers.len())
            .finish()
    }
}

impl<T: Clone + 'static> Observable<T> {
    /// Create an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                id: SourceId::next(),
                state: RefCell::new(ObservableState {
                    value: initial,
                    watchers: SubscriberList::new(),
                }),
            }),
        }
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.inner.state.borrow().value.clone()
    }

    /// Replace the value and notify every watcher.
    pub fn set(&self, value: T) {
        let watchers = {
            let mut state = self.inner.state.borrow_mut();
            state.value = value.clone();
            state.watchers.snapshot()
        };
        broadcast(&watchers, &value, "observable");
    }

    /// Mutate the value in place and notify every watcher.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let (value, watchers) = {
            let mut state = self.inner.state.borrow_mut();
            f(&mut state.value);
            (state.value.clone(), state.watchers.snapshot())
        };
        broadcast(&watchers, &value, "observable");
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.state.borrow().watchers.len()
    }
}

impl<T: Clone + 'static> Subscribable for Observable<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn subscribe(&self, on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        Ok(self.inner.state.borrow_mut().watchers.insert(on_next))
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, on_next: &dyn Fn(T)) -> bool {
        let value = self.get();
        on_next(value);
        true
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner.state.borrow_mut().watchers.remove(token);
    }
}
