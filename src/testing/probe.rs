//! `Probe<S>`: a source wrapper counting subscription traffic.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::subscribable::{Callback, SourceId, Subscribable, SubscriptionToken};

struct Counters {
    id: SourceId,
    subscribes: Cell<usize>,
    unsubscribes: Cell<usize>,
    deliveries: Cell<usize>,
}

/// Wraps a source and counts how it is used.
///
/// The probe has its own identity, so a cell reading the probe tracks it as a
/// separate dependency from the wrapped source.
pub struct Probe<S> {
    source: S,
    counters: Rc<Counters>,
}

impl<S: Clone> Clone for Probe<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            counters: Rc::clone(&self.counters),
        }
    }
}

impl<S> fmt::Debug for Probe<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("id", &self.counters.id)
            .field("subscribes", &self.counters.subscribes.get())
            .field("unsubscribes", &self.counters.unsubscribes.get())
            .finish()
    }
}

impl<S: Subscribable> Probe<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            counters: Rc::new(Counters {
                id: SourceId::next(),
                subscribes: Cell::new(0),
                unsubscribes: Cell::new(0),
                deliveries: Cell::new(0),
            }),
        }
    }

    /// The wrapped source.
    pub fn inner(&self) -> &S {
        &self.source
    }

    /// Total `subscribe` calls.
    pub fn subscribes(&self) -> usize {
        self.counters.subscribes.get()
    }

    /// Total `unsubscribe` calls.
    pub fn unsubscribes(&self) -> usize {
        self.counters.unsubscribes.get()
    }

    /// Successful `try_deliver_current` calls.
    pub fn immediate_deliveries(&self) -> usize {
        self.counters.deliveries.get()
    }

    /// Subscriptions currently outstanding.
    pub fn active(&self) -> usize {
        self.subscribes().saturating_sub(self.unsubscribes())
    }
}

impl<S: Subscribable> Subscribable for Probe<S> {
    type Value = S::Value;

    fn source_id(&self) -> SourceId {
        self.counters.id
    }

    fn subscribe(&self, on_next: Callback<S::Value>) -> Result<SubscriptionToken, ReactiveError> {
        let token = self.source.subscribe(on_next)?;
        self.counters.subscribes.set(self.counters.subscribes.get() + 1);
        Ok(token)
    }

    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(S::Value)) -> bool {
        let delivered = self.source.try_deliver_current(token, on_next);
        if delivered {
            self.counters.deliveries.set(self.counters.deliveries.get() + 1);
        }
        delivered
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.counters.unsubscribes.set(self.counters.unsubscribes.get() + 1);
        self.source.unsubscribe(token);
    }
}
