//! The cell engine: phases, refresh, delivery, and staged subscriber changes.
//!
//! A [`Cell`] is dormant until its first subscriber arrives. Activation runs
//! the thunk once; afterwards every upstream delivery triggers a refresh,
//! and subscribers hear about the result only when it changed. Dropping the
//! last subscriber releases every upstream subscription and the cached value.
//!
//! # Phases
//!
//! `Idle → Recomputing → (Idle | Broadcasting → Idle)`. No `RefCell` borrow is
//! held while user code runs, so thunks and subscriber callbacks may freely
//! touch other cells. Re-entering *this* cell is constrained by the phase:
//!
//! - subscribing while `Recomputing` is a cycle;
//! - subscribing or unsubscribing while busy is staged and applied once the
//!   cell is back to `Idle`;
//! - an upstream delivery while busy (other than the immediate value of the
//!   source currently being resolved) is a cycle.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::generation::{Carried, Dependency, Generations};
use super::read::{ReadCx, Tracker};
use crate::config::CellConfig;
use crate::error::{panic_message, ReactiveError};
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a cell is in its update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not doing anything; the only phase in which a refresh may start.
    Idle,
    /// The thunk is running.
    Recomputing,
    /// Subscribers are being notified of a new value.
    Broadcasting,
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// A subscriber change that arrived while the cell was busy.
enum Staged<T> {
    Add(SubscriptionToken, Callback<T>),
    Remove(SubscriptionToken),
}

struct CellState<T> {
    phase: Phase,
    cached: Option<T>,
    subscribers: SubscriberList<T>,
    /// Reused between rounds; empty whenever the cell is idle.
    staged: Vec<Staged<T>>,
    generations: Generations,
    /// The source whose immediate value is being picked up right now.
    resolving: Option<SourceId>,
    /// Set when a delivery arrived mid-recompute.
    cycle: bool,
}

type Thunk<T> = Box<dyn Fn(&mut ReadCx<'_>) -> Result<T, ReactiveError>>;

pub(crate) struct CellShared<T> {
    id: SourceId,
    config: CellConfig,
    this: Weak<CellShared<T>>,
    thunk: Thunk<T>,
    state: RefCell<CellState<T>>,
}

enum Delivery {
    Refresh,
    Cycle,
    Ignore,
}

impl<T: Clone + PartialEq + 'static> CellShared<T> {
    fn label(&self) -> &str {
        self.config.display_label()
    }

    fn subscribe(&self, on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        let activating = {
            let mut st = self.state.borrow_mut();
            let phase = st.phase;
            match phase {
                Phase::Recomputing => {
                    tracing::error!(cell = self.label(), "subscribed to itself while recomputing");
                    return Err(ReactiveError::CircularDependency);
                }
                Phase::Broadcasting => {
                    let token = st.subscribers.reserve();
                    st.staged.push(Staged::Add(token, on_next));
                    return Ok(token);
                }
                Phase::Idle => st.subscribers.is_empty(),
            }
        };

        if activating {
            tracing::trace!(cell = self.label(), "activating");
            if let Err(err) = self.refresh() {
                self.teardown();
                return Err(err);
            }
        }
        Ok(self.state.borrow_mut().subscribers.insert(on_next))
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let emptied = {
            let mut st = self.state.borrow_mut();
            if st.phase != Phase::Idle {
                st.staged.push(Staged::Remove(token));
                return;
            }
            st.subscribers.remove(token) && st.subscribers.is_empty()
        };
        if emptied {
            self.teardown();
        }
    }

    fn try_deliver_current(&self, on_next: &dyn Fn(T)) -> bool {
        let cached = self.state.borrow().cached.clone();
        match cached {
            Some(value) => {
                on_next(value);
                true
            }
            None => false,
        }
    }

    /// Return to dormancy: drop the cached value and every upstream subscription.
    fn teardown(&self) {
        let released = {
            let mut st = self.state.borrow_mut();
            st.cached = None;
            st.generations.drain_all()
        };
        tracing::trace!(cell = self.label(), released = released.len(), "dormant");
        for dep in released {
            dep.release();
        }
    }

    /// Recompute, releasing unread dependencies and broadcasting on change.
    ///
    /// Thunk failures keep the previous value and are not reported; only a
    /// circular dependency is returned.
    fn refresh(&self) -> Result<(), ReactiveError> {
        {
            let mut st = self.state.borrow_mut();
            if st.phase != Phase::Idle {
                return Err(ReactiveError::CircularDependency);
            }
            st.generations.begin_round();
            st.phase = Phase::Recomputing;
            st.resolving = None;
            st.cycle = false;
        }

        let outcome = self.evaluate();

        let (stale, cycle) = {
            let mut st = self.state.borrow_mut();
            (st.generations.end_round(), st.cycle)
        };
        let released = stale.len();
        for dep in stale {
            dep.release();
        }

        let outcome = if cycle {
            Err(ReactiveError::CircularDependency)
        } else {
            outcome
        };
        let value = match outcome {
            Ok(value) => value,
            Err(err) if err.is_fatal() => {
                self.settle();
                return Err(err);
            }
            Err(err) => {
                tracing::debug!(
                    cell = self.label(),
                    error = %err,
                    "recompute failed; keeping previous value"
                );
                self.settle();
                return Ok(());
            }
        };

        let listeners = {
            let mut st = self.state.borrow_mut();
            if st.cached.as_ref() == Some(&value) {
                None
            } else {
                st.phase = Phase::Broadcasting;
                st.cached = Some(value.clone());
                Some(st.subscribers.snapshot())
            }
        };
        if self.config.trace_refresh {
            tracing::trace!(
                cell = self.label(),
                changed = listeners.is_some(),
                released,
                "refreshed"
            );
        }
        if let Some(listeners) = listeners {
            broadcast(&listeners, &value, self.label());
        }
        self.settle();
        Ok(())
    }

    fn evaluate(&self) -> Result<T, ReactiveError> {
        let mut cx = ReadCx::new(self);
        match panic::catch_unwind(AssertUnwindSafe(|| (self.thunk)(&mut cx))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(ReactiveError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Back to `Idle`, applying subscriber changes staged while busy.
    fn settle(&self) {
        let emptied = {
            let mut st = self.state.borrow_mut();
            let st = &mut *st;
            st.phase = Phase::Idle;
            let mut removed = false;
            for change in st.staged.drain(..) {
                match change {
                    Staged::Add(token, callback) => {
                        st.subscribers.attach(token, callback);
                    }
                    Staged::Remove(token) => {
                        removed |= st.subscribers.remove(token);
                    }
                }
            }
            removed && st.subscribers.is_empty()
        };
        if emptied {
            self.teardown();
        }
    }

    /// Route a value pushed by the upstream source `id`.
    fn deliver(&self, id: SourceId, value: Rc<dyn Any>) {
        let action = {
            let mut st = self.state.borrow_mut();
            let phase = st.phase;
            match phase {
                Phase::Idle => {
                    if st.generations.record(id, value) {
                        Delivery::Refresh
                    } else {
                        Delivery::Ignore
                    }
                }
                Phase::Recomputing if st.resolving == Some(id) => {
                    st.generations.record(id, value);
                    Delivery::Ignore
                }
                Phase::Recomputing => {
                    st.cycle = true;
                    Delivery::Cycle
                }
                Phase::Broadcasting => Delivery::Cycle,
            }
        };
        match action {
            Delivery::Refresh => {
                if let Err(err) = self.refresh() {
                    tracing::error!(cell = self.label(), error = %err, "refresh after upstream change failed");
                }
            }
            Delivery::Cycle => {
                tracing::error!(
                    cell = self.label(),
                    source = %id,
                    "circular dependency: upstream changed while the cell was busy"
                );
            }
            Delivery::Ignore => {}
        }
    }
}

impl<T: Clone + PartialEq + 'static> Tracker for CellShared<T> {
    fn carry(&self, id: SourceId) -> Carried {
        self.state.borrow_mut().generations.carry(id)
    }

    fn adopt(&self, id: SourceId, dependency: Dependency) {
        self.state.borrow_mut().generations.adopt(id, dependency);
    }

    fn set_resolving(&self, id: Option<SourceId>) {
        self.state.borrow_mut().resolving = id;
    }

    fn deliverer(&self, id: SourceId) -> Rc<dyn Fn(Rc<dyn Any>)> {
        let this = self.this.clone();
        Rc::new(move |value| {
            if let Some(cell) = this.upgrade() {
                cell.deliver(id, value);
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A self-adjusting computation node.
///
/// Cloning creates a new handle to the **same** node.
pub struct Cell<T> {
    shared: Rc<CellShared<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.shared.state.borrow();
        f.debug_struct("Cell")
            .field("id", &self.shared.id)
            .field("label", &self.shared.config.label)
            .field("phase", &st.phase)
            .field("cached", &st.cached)
            .field("subscribers", &st.subscribers.len())
            .field("dependencies", &st.generations.len())
            .finish()
    }
}

/// Create a dormant cell. Shorthand for [`Cell::new`].
pub fn new_cell<T, F>(thunk: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&mut ReadCx<'_>) -> Result<T, ReactiveError> + 'static,
{
    Cell::new(thunk)
}

impl<T: Clone + PartialEq + 'static> Cell<T> {
    /// Create a dormant cell computing its value with `thunk`.
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn(&mut ReadCx<'_>) -> Result<T, ReactiveError> + 'static,
    {
        Self::with_config(CellConfig::default(), thunk)
    }

    /// Create a dormant cell with an explicit configuration.
    pub fn with_config<F>(config: CellConfig, thunk: F) -> Self
    where
        F: Fn(&mut ReadCx<'_>) -> Result<T, ReactiveError> + 'static,
    {
        let shared = Rc::new_cyclic(|this| CellShared {
            id: SourceId::next(),
            config,
            this: this.clone(),
            thunk: Box::new(thunk),
            state: RefCell::new(CellState {
                phase: Phase::Idle,
                cached: None,
                subscribers: SubscriberList::new(),
                staged: Vec::new(),
                generations: Generations::new(),
                resolving: None,
                cycle: false,
            }),
        });
        Self { shared }
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    /// No subscribers, no cached value, no upstream subscriptions.
    pub fn is_dormant(&self) -> bool {
        let st = self.shared.state.borrow();
        st.subscribers.is_empty() && st.cached.is_none() && st.generations.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.borrow().subscribers.len()
    }

    /// Number of upstream sources currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.shared.state.borrow().generations.len()
    }

    /// The cached value, without subscribing.
    pub fn peek(&self) -> Option<T> {
        self.shared.state.borrow().cached.clone()
    }

    pub fn label(&self) -> Option<&str> {
        self.shared.config.label.as_deref()
    }
}

impl<T: Clone + PartialEq + 'static> Subscribable for Cell<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.shared.id
    }

    fn subscribe(&self, on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        self.shared.subscribe(on_next)
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, on_next: &dyn Fn(T)) -> bool {
        self.shared.try_deliver_current(on_next)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.shared.unsubscribe(token)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
