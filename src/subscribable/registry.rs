//! Ordered subscriber registry and panic-isolating broadcast.
//!
//! [`SubscriberList`] hands out slotmap-backed [`SubscriptionToken`]s and keeps
//! callbacks in registration order. Broadcasting always goes through a
//! snapshot so callbacks are free to subscribe or unsubscribe while they run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use slotmap::SlotMap;

use super::token::SubscriptionToken;
use super::traits::Callback;
use crate::error::panic_message;

// ---------------------------------------------------------------------------
// SubscriberList
// ---------------------------------------------------------------------------

/// Registration-ordered set of subscriber callbacks.
///
/// A token may be *reserved* before it is attached to a callback; the cell
/// engine uses this to hand out tokens for subscriptions it stages during a
/// broadcast.
pub struct SubscriberList<T> {
    tokens: SlotMap<SubscriptionToken, ()>,
    live: Vec<(SubscriptionToken, Callback<T>)>,
}

impl<T> SubscriberList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            tokens: SlotMap::with_key(),
            live: Vec::new(),
        }
    }

    /// Register a callback at the end of the order.
    pub fn insert(&mut self, callback: Callback<T>) -> SubscriptionToken {
        let token = self.reserve();
        self.live.push((token, callback));
        token
    }

    /// Allocate a token without registering a callback yet.
    pub fn reserve(&mut self) -> SubscriptionToken {
        self.tokens.insert(())
    }

    /// Attach a callback to a previously reserved token.
    ///
    /// Returns `false` if the token was released in the meantime.
    pub fn attach(&mut self, token: SubscriptionToken, callback: Callback<T>) -> bool {
        if !self.tokens.contains_key(token) {
            return false;
        }
        self.live.push((token, callback));
        true
    }

    /// Release a token and drop its callback, if any.
    ///
    /// Returns `false` for unknown or already-released tokens.
    pub fn remove(&mut self, token: SubscriptionToken) -> bool {
        if self.tokens.remove(token).is_none() {
            return false;
        }
        self.live.retain(|(t, _)| *t != token);
        true
    }

    /// Whether the token is currently attached to a callback.
    pub fn contains(&self, token: SubscriptionToken) -> bool {
        self.live.iter().any(|(t, _)| *t == token)
    }

    /// Number of attached callbacks.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no callback is attached.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Clone the attached callbacks, in registration order.
    pub fn snapshot(&self) -> Vec<Callback<T>> {
        self.live.iter().map(|(_, cb)| cb.clone()).collect()
    }

    /// Release every token.
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.live.clear();
    }
}

impl<T> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscriberList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberList")
            .field("live", &self.live.len())
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// Invoke every callback with a clone of `value`, in order.
///
/// A panicking callback is caught and logged; the remaining callbacks still
/// run. Returns the number of callbacks that panicked.
pub fn broadcast<T: Clone>(listeners: &[Callback<T>], value: &T, origin: &str) -> usize {
    let mut failures = 0;
    for listener in listeners {
        let value = value.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
            failures += 1;
            tracing::error!(
                origin,
                panic = %panic_message(payload.as_ref()),
                "subscriber callback panicked"
            );
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn logger(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Callback<i32> {
        let log = log.clone();
        Rc::new(move |v: i32| log.borrow_mut().push(format!("{tag}:{v}")))
    }

    // ── Registration ─────────────────────────────────────────────────

    #[test]
    fn new_list_is_empty() {
        let list: SubscriberList<i32> = SubscriberList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn insert_and_remove() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = SubscriberList::new();
        let a = list.insert(logger(&log, "a"));
        let b = list.insert(logger(&log, "b"));
        assert_eq!(list.len(), 2);
        assert!(list.remove(a));
        assert!(!list.remove(a));
        assert!(!list.contains(a));
        assert!(list.contains(b));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn reserved_token_counts_only_once_attached() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = SubscriberList::new();
        let t = list.reserve();
        assert!(list.is_empty());
        assert!(list.attach(t, logger(&log, "late")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn attach_after_release_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = SubscriberList::new();
        let t = list.reserve();
        assert!(list.remove(t));
        assert!(!list.attach(t, logger(&log, "gone")));
        assert!(list.is_empty());
    }

    // ── Broadcast ────────────────────────────────────────────────────

    #[test]
    fn broadcast_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = SubscriberList::new();
        list.insert(logger(&log, "first"));
        list.insert(logger(&log, "second"));
        list.insert(logger(&log, "third"));
        let failures = broadcast(&list.snapshot(), &7, "test");
        assert_eq!(failures, 0);
        assert_eq!(*log.borrow(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn broadcast_isolates_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = SubscriberList::new();
        list.insert(logger(&log, "before"));
        list.insert(Rc::new(|_: i32| panic!("subscriber exploded")));
        list.insert(logger(&log, "after"));
        let failures = broadcast(&list.snapshot(), &1, "test");
        assert_eq!(failures, 1);
        assert_eq!(*log.borrow(), vec!["before:1", "after:1"]);
    }

    #[test]
    fn debug_output() {
        let mut list: SubscriberList<i32> = SubscriberList::new();
        list.insert(Rc::new(|_| {}));
        let dbg = format!("{:?}", list);
        assert!(dbg.contains("SubscriberList"));
        assert!(dbg.contains("live: 1"));
    }
}
