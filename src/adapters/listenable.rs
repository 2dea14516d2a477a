//! Host-style listenables and their source adapters.
//!
//! A *listenable* only says "something changed"; it has no subscription
//! protocol of its own. Two adapters bridge it to [`Subscribable`]:
//!
//! - [`ValueListenableSource`] reads the listenable's value on every tick.
//! - [`ListenableSource`] counts ticks, so a cell reading it recomputes on
//!   every notification.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::error::ReactiveError;
use crate::subscribable::{
    broadcast, Callback, SourceId, Subscribable, SubscriberList, SubscriptionToken,
};

/// Handle for a listener attached to a [`Listenable`].
pub type ListenerId = SubscriptionToken;

/// Something that can tell listeners it changed.
pub trait Listenable {
    /// Attach a listener; it runs on every notification.
    fn add_listener(&self, listener: Rc<dyn Fn()>) -> ListenerId;
    /// Detach a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}

/// A listenable that also exposes a current value.
pub trait ValueListenable: Listenable {
    type Value: Clone + 'static;
    fn value(&self) -> Self::Value;
}

fn wrap(listener: Rc<dyn Fn()>) -> Callback<()> {
    Rc::new(move |()| listener())
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A plain change notifier.
#[derive(Clone)]
pub struct Notifier {
    listeners: Rc<RefCell<SubscriberList<()>>>,
    /// Shared by every adapter handed out by [`Notifier::source`].
    ticks: Rc<Links<(ListenerId, Rc<Cell<u64>>)>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self {
            listeners: Rc::default(),
            ticks: Links::new(),
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every listener once.
    pub fn notify_listeners(&self) {
        let listeners = self.listeners.borrow().snapshot();
        broadcast(&listeners, &(), "notifier");
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Adapt this notifier into a tick-counting source.
    ///
    /// Every call returns a handle to the same source, so reading
    /// `notifier.source()` inline in a thunk keeps one dependency.
    pub fn source(&self) -> ListenableSource<Self> {
        ListenableSource {
            listenable: self.clone(),
            links: Rc::clone(&self.ticks),
        }
    }
}

impl Listenable for Notifier {
    fn add_listener(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        self.listeners.borrow_mut().insert(wrap(listener))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(id);
    }
}

// ---------------------------------------------------------------------------
// ValueNotifier
// ---------------------------------------------------------------------------

struct ValueNotifierState<T> {
    value: T,
    listeners: SubscriberList<()>,
}

/// A notifier holding a value; notifies only when the value changes.
pub struct ValueNotifier<T> {
    state: Rc<RefCell<ValueNotifierState<T>>>,
    links: Rc<Links<ListenerId>>,
}

impl<T> Clone for ValueNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            links: Rc::clone(&self.links),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ValueNotifier")
            .field("value", &state.value)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> ValueNotifier<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(ValueNotifierState {
                value,
                listeners: SubscriberList::new(),
            })),
            links: Links::new(),
        }
    }

    /// Store `value`; listeners run only if it differs from the old one.
    pub fn set(&self, value: T) {
        let listeners = {
            let mut state = self.state.borrow_mut();
            if state.value == value {
                return;
            }
            state.value = value;
            state.listeners.snapshot()
        };
        broadcast(&listeners, &(), "value-notifier");
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Adapt this notifier into a value source.
    ///
    /// Every call returns a handle to the same source.
    pub fn source(&self) -> ValueListenableSource<Self> {
        ValueListenableSource {
            listenable: self.clone(),
            links: Rc::clone(&self.links),
        }
    }
}

impl<T> Listenable for ValueNotifier<T> {
    fn add_listener(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        self.state.borrow_mut().listeners.insert(wrap(listener))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state.borrow_mut().listeners.remove(id);
    }
}

impl<T: Clone + 'static> ValueListenable for ValueNotifier<T> {
    type Value = T;

    fn value(&self) -> T {
        self.state.borrow().value.clone()
    }
}

// ---------------------------------------------------------------------------
// ValueListenableSource
// ---------------------------------------------------------------------------

struct Links<V> {
    id: SourceId,
    links: RefCell<SlotMap<SubscriptionToken, V>>,
}

impl<V> Links<V> {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            id: SourceId::next(),
            links: RefCell::new(SlotMap::with_key()),
        })
    }
}

/// Source adapter delivering a [`ValueListenable`]'s value on every tick.
pub struct ValueListenableSource<L> {
    listenable: L,
    links: Rc<Links<ListenerId>>,
}

impl<L: Clone> Clone for ValueListenableSource<L> {
    fn clone(&self) -> Self {
        Self {
            listenable: self.listenable.clone(),
            links: Rc::clone(&self.links),
        }
    }
}

impl<L> fmt::Debug for ValueListenableSource<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueListenableSource")
            .field("id", &self.links.id)
            .field("links", &self.links.links.borrow().len())
            .finish()
    }
}

impl<L: ValueListenable + Clone + 'static> ValueListenableSource<L> {
    pub fn new(listenable: L) -> Self {
        Self {
            listenable,
            links: Links::new(),
        }
    }
}

impl<L: ValueListenable + Clone + 'static> Subscribable for ValueListenableSource<L> {
    type Value = L::Value;

    fn source_id(&self) -> SourceId {
        self.links.id
    }

    fn subscribe(&self, on_next: Callback<L::Value>) -> Result<SubscriptionToken, ReactiveError> {
        let listenable = self.listenable.clone();
        let listener = self
            .listenable
            .add_listener(Rc::new(move || on_next(listenable.value())));
        Ok(self.links.links.borrow_mut().insert(listener))
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, on_next: &dyn Fn(L::Value)) -> bool {
        on_next(self.listenable.value());
        true
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let listener = self.links.links.borrow_mut().remove(token);
        if let Some(listener) = listener {
            self.listenable.remove_listener(listener);
        }
    }
}

// ---------------------------------------------------------------------------
// ListenableSource
// ---------------------------------------------------------------------------

/// Source adapter turning a plain [`Listenable`] into a tick counter.
///
/// Each subscription counts independently, starting at 0.
pub struct ListenableSource<L> {
    listenable: L,
    links: Rc<Links<(ListenerId, Rc<Cell<u64>>)>>,
}

impl<L: Clone> Clone for ListenableSource<L> {
    fn clone(&self) -> Self {
        Self {
            listenable: self.listenable.clone(),
            links: Rc::clone(&self.links),
        }
    }
}

impl<L> fmt::Debug for ListenableSource<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenableSource")
            .field("id", &self.links.id)
            .field("links", &self.links.links.borrow().len())
            .finish()
    }
}

impl<L: Listenable + Clone + 'static> ListenableSource<L> {
    pub fn new(listenable: L) -> Self {
        Self {
            listenable,
            links: Links::new(),
        }
    }
}

impl<L: Listenable + Clone + 'static> Subscribable for ListenableSource<L> {
    type Value = u64;

    fn source_id(&self) -> SourceId {
        self.links.id
    }

    fn subscribe(&self, on_next: Callback<u64>) -> Result<SubscriptionToken, ReactiveError> {
        let ticks = Rc::new(Cell::new(0_u64));
        let counter = ticks.clone();
        let listener = self.listenable.add_listener(Rc::new(move || {
            let n = counter.get() + 1;
            counter.set(n);
            on_next(n);
        }));
        Ok(self.links.links.borrow_mut().insert((listener, ticks)))
    }

    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(u64)) -> bool {
        let ticks = self.links.links.borrow().get(token).map(|(_, t)| t.get());
        match ticks {
            Some(n) => {
                on_next(n);
                true
            }
            None => false,
        }
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let link = self.links.links.borrow_mut().remove(token);
        if let Some((listener, _)) = link {
            self.listenable.remove_listener(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use pretty_assertions::assert_eq;

    // ── Notifier ─────────────────────────────────────────────────────

    #[test]
    fn notifier_runs_listeners() {
        let notifier = Notifier::new();
        let hits = Rc::new(Cell::new(0));
        let hits_c = hits.clone();
        let id = notifier.add_listener(Rc::new(move || hits_c.set(hits_c.get() + 1)));
        notifier.notify_listeners();
        notifier.notify_listeners();
        assert_eq!(hits.get(), 2);
        notifier.remove_listener(id);
        notifier.notify_listeners();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn value_notifier_skips_equal_values() {
        let vn = ValueNotifier::new(1);
        let hits = Rc::new(Cell::new(0));
        let hits_c = hits.clone();
        vn.add_listener(Rc::new(move || hits_c.set(hits_c.get() + 1)));
        vn.set(1);
        assert_eq!(hits.get(), 0);
        vn.set(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(vn.value(), 2);
    }

    // ── Adapters ─────────────────────────────────────────────────────

    #[test]
    fn value_source_delivers_value_per_tick() {
        let vn = ValueNotifier::new("a".to_string());
        let source = vn.source();
        let recorder = Recorder::new();
        let token = source.subscribe(recorder.callback()).unwrap();
        assert!(source.try_deliver_current(token, &|v| assert_eq!(v, "a")));
        vn.set("b".to_string());
        vn.set("c".to_string());
        assert_eq!(recorder.values(), vec!["b".to_string(), "c".to_string()]);

        source.unsubscribe(token);
        assert_eq!(vn.listener_count(), 0);
        vn.set("d".to_string());
        assert_eq!(recorder.values().len(), 2);
    }

    #[test]
    fn tick_source_counts_per_subscription() {
        let notifier = Notifier::new();
        let source = notifier.source();
        let first = Recorder::new();
        let t1 = source.subscribe(first.callback()).unwrap();
        assert!(source.try_deliver_current(t1, &|n| assert_eq!(n, 0)));

        notifier.notify_listeners();
        notifier.notify_listeners();

        let second = Recorder::new();
        let t2 = source.subscribe(second.callback()).unwrap();
        notifier.notify_listeners();

        assert_eq!(first.values(), vec![1, 2, 3]);
        assert_eq!(second.values(), vec![1]);
        assert!(source.try_deliver_current(t2, &|n| assert_eq!(n, 1)));

        source.unsubscribe(t1);
        source.unsubscribe(t2);
        assert_eq!(notifier.listener_count(), 0);
        assert!(!source.try_deliver_current(t1, &|_| {}));
    }

    #[test]
    fn repeated_source_calls_share_identity() {
        let notifier = Notifier::new();
        let source = notifier.source();
        assert_eq!(source.source_id(), source.clone().source_id());
        assert_eq!(source.source_id(), notifier.source().source_id());
        assert_ne!(source.source_id(), Notifier::new().source().source_id());

        let vn = ValueNotifier::new(0);
        assert_eq!(vn.source().source_id(), vn.clone().source().source_id());
        assert_ne!(vn.source().source_id(), ValueNotifier::new(0).source().source_id());
    }

    #[test]
    fn inline_source_read_keeps_one_dependency() {
        let notifier = Notifier::new();
        let vn = ValueNotifier::new(10);
        let (n, v) = (notifier.clone(), vn.clone());
        let cell = crate::cell::Cell::new(move |cx| {
            Ok(cx.read(&n.source())? + cx.read(&v.source())? as u64)
        });
        let recorder = Recorder::new();
        cell.subscribe(recorder.callback()).unwrap();

        notifier.notify_listeners();
        notifier.notify_listeners();
        vn.set(20);
        assert_eq!(recorder.values(), vec![11, 12, 22]);
        assert_eq!(cell.dependency_count(), 2);
        assert_eq!(notifier.listener_count(), 1);
        assert_eq!(vn.listener_count(), 1);
    }
}
