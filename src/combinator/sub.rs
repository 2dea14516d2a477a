//! Scalar form: `sub(source, f)`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;

use super::replace_if_changed;
use crate::error::ReactiveError;
use crate::subscribable::{Callback, SourceId, Subscribable, SubscriptionToken};

struct Link<U> {
    upstream: SubscriptionToken,
    /// Last value emitted on this subscription.
    last: Rc<RefCell<Option<U>>>,
}

struct SubInner<S: Subscribable, U> {
    id: SourceId,
    source: S,
    map: Rc<dyn Fn(S::Value) -> U>,
    links: RefCell<SlotMap<SubscriptionToken, Link<U>>>,
}

/// A source emitting `f(latest)` for every upstream value, deduplicated.
///
/// Each downstream subscription owns its own upstream subscription and its
/// own "last emitted" record.
pub struct Sub<S: Subscribable, U> {
    inner: Rc<SubInner<S, U>>,
}

impl<S: Subscribable, U> Clone for Sub<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: Subscribable, U> fmt::Debug for Sub<S, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sub")
            .field("id", &self.inner.id)
            .field("upstream", &self.inner.source.source_id())
            .field("links", &self.inner.links.borrow().len())
            .finish()
    }
}

/// Derive a source that maps every value of `source` through `f` and only
/// emits when the mapped result changes.
pub fn sub<S, U, F>(source: S, f: F) -> Sub<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
    F: Fn(S::Value) -> U + 'static,
{
    Sub {
        inner: Rc::new(SubInner {
            id: SourceId::next(),
            source,
            map: Rc::new(f),
            links: RefCell::new(SlotMap::with_key()),
        }),
    }
}

impl<S, U> Sub<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
{
    /// Number of live downstream subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.links.borrow().len()
    }
}

impl<S, U> Subscribable for Sub<S, U>
where
    S: Subscribable + 'static,
    U: Clone + PartialEq + 'static,
{
    type Value = U;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn subscribe(&self, on_next: Callback<U>) -> Result<SubscriptionToken, ReactiveError> {
        let last = Rc::new(RefCell::new(None));
        let forward: Callback<S::Value> = {
            let map = self.inner.map.clone();
            let last = last.clone();
            Rc::new(move |x| {
                let y = map(x);
                if replace_if_changed(&last, &y) {
                    on_next(y);
                }
            })
        };
        let upstream = self.inner.source.subscribe(forward)?;
        Ok(self.inner.links.borrow_mut().insert(Link { upstream, last }))
    }

    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(U)) -> bool {
        let link = self
            .inner
            .links
            .borrow()
            .get(token)
            .map(|link| (link.upstream, link.last.clone()));
        let Some((upstream, last)) = link else {
            return false;
        };
        let map = self.inner.map.clone();
        self.inner.source.try_deliver_current(upstream, &|x| {
            let y = map(x);
            *last.borrow_mut() = Some(y.clone());
            on_next(y);
        })
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let link = self.inner.links.borrow_mut().remove(token);
        if let Some(link) = link {
            self.inner.source.unsubscribe(link.upstream);
        }
    }
}
