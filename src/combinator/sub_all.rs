//! Vector form: `sub_all(sources, f)`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;

use super::replace_if_changed;
use crate::error::ReactiveError;
use crate::subscribable::{Callback, SourceId, Subscribable, SubscriptionToken};

type Combine<T, U> = Rc<dyn Fn(&[Option<T>]) -> U>;

struct FanIn<T, U> {
    /// Latest value per upstream, `None` until that upstream delivers.
    slots: RefCell<Vec<Option<T>>>,
    last: RefCell<Option<U>>,
    /// Set while `try_deliver_current` collects immediate values.
    filling: Cell<bool>,
}

struct Link<T, U> {
    upstream: Vec<SubscriptionToken>,
    state: Rc<FanIn<T, U>>,
}

struct SubAllInner<S: Subscribable, U> {
    id: SourceId,
    sources: Vec<S>,
    combine: Combine<S::Value, U>,
    links: RefCell<SlotMap<SubscriptionToken, Link<S::Value, U>>>,
}

/// A source combining the latest values of many sources.
pub struct SubAll<S: Subscribable, U> {
    inner: Rc<SubAllInner<S, U>>,
}

impl<S: Subscribable, U> Clone for SubAll<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: Subscribable, U> fmt::Debug for SubAll<S, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAll")
            .field("id", &self.inner.id)
            .field("sources", &self.inner.sources.len())
            .field("links", &self.inner.links.borrow().len())
            .finish()
    }
}

/// Derive a source from the latest values of every source in `sources`.
///
/// `f` receives one slot per source, `None` for sources that have not
/// delivered yet. After the initial fill, every upstream emission recomputes
/// `f` and emits when the result changes. `try_deliver_current` succeeds only
/// if *every* upstream has an immediate value.
pub fn sub_all<S, U, F>(sources: Vec<S>, f: F) -> SubAll<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
    F: Fn(&[Option<S::Value>]) -> U + 'static,
{
    SubAll {
        inner: Rc::new(SubAllInner {
            id: SourceId::next(),
            sources,
            combine: Rc::new(f),
            links: RefCell::new(SlotMap::with_key()),
        }),
    }
}

impl<S, U> SubAll<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
{
    /// Number of live downstream subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.links.borrow().len()
    }

    fn forward(
        &self,
        index: usize,
        state: &Rc<FanIn<S::Value, U>>,
        on_next: &Callback<U>,
    ) -> Callback<S::Value> {
        let state = state.clone();
        let combine = self.inner.combine.clone();
        let on_next = on_next.clone();
        Rc::new(move |x| {
            state.slots.borrow_mut()[index] = Some(x);
            if state.filling.get() {
                return;
            }
            let y = {
                let slots = state.slots.borrow();
                combine(&slots)
            };
            if replace_if_changed(&state.last, &y) {
                on_next(y);
            }
        })
    }
}

impl<S, U> Subscribable for SubAll<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
{
    type Value = U;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn subscribe(&self, on_next: Callback<U>) -> Result<SubscriptionToken, ReactiveError> {
        let state = Rc::new(FanIn {
            slots: RefCell::new(vec![None; self.inner.sources.len()]),
            last: RefCell::new(None),
            filling: Cell::new(false),
        });
        let mut upstream = Vec::with_capacity(self.inner.sources.len());
        for (index, source) in self.inner.sources.iter().enumerate() {
            match source.subscribe(self.forward(index, &state, &on_next)) {
                Ok(token) => upstream.push(token),
                Err(err) => {
                    for (source, token) in self.inner.sources.iter().zip(upstream) {
                        source.unsubscribe(token);
                    }
                    return Err(err);
                }
            }
        }
        Ok(self.inner.links.borrow_mut().insert(Link { upstream, state }))
    }

    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(U)) -> bool {
        let link = self
            .inner
            .links
            .borrow()
            .get(token)
            .map(|link| (link.upstream.clone(), link.state.clone()));
        let Some((upstream, state)) = link else {
            return false;
        };

        state.filling.set(true);
        let mut complete = true;
        for (index, (source, token)) in self.inner.sources.iter().zip(upstream).enumerate() {
            let delivered = source.try_deliver_current(token, &|x| {
                state.slots.borrow_mut()[index] = Some(x);
            });
            complete &= delivered;
        }
        state.filling.set(false);

        if !complete {
            return false;
        }
        let y = {
            let slots = state.slots.borrow();
            (self.inner.combine)(&slots)
        };
        *state.last.borrow_mut() = Some(y.clone());
        on_next(y);
        true
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let link = self.inner.links.borrow_mut().remove(token);
        if let Some(link) = link {
            for (source, token) in self.inner.sources.iter().zip(link.upstream) {
                source.unsubscribe(token);
            }
        }
    }
}
