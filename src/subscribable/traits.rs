//! The [`Subscribable`] trait and its extension methods.

use std::rc::Rc;

use super::token::{SourceId, SubscriptionToken};
use crate::combinator::Sub;
use crate::error::ReactiveError;

/// A shared subscriber callback.
pub type Callback<T> = Rc<dyn Fn(T)>;

/// Wrap a closure as a [`Callback`].
pub fn callback<T>(f: impl Fn(T) + 'static) -> Callback<T> {
    Rc::new(f)
}

// ---------------------------------------------------------------------------
// Subscribable
// ---------------------------------------------------------------------------

/// A push-based value source.
///
/// The protocol is always `subscribe`, then (immediately) `try_deliver_current`
/// to pick up a value the source already holds, then any number of pushed
/// values, then `unsubscribe`.
pub trait Subscribable {
    /// The type of value this source pushes.
    type Value: Clone + 'static;

    /// Identity of the underlying node. Clones of a handle share it.
    fn source_id(&self) -> SourceId;

    /// Register `on_next` for every *future* value.
    ///
    /// Must never invoke `on_next` synchronously with the current value; use
    /// [`try_deliver_current`](Subscribable::try_deliver_current) for that.
    /// May start sourcing events as a side effect.
    fn subscribe(&self, on_next: Callback<Self::Value>) -> Result<SubscriptionToken, ReactiveError>;

    /// If the source currently holds a value, call `on_next` once with it and
    /// return `true`. Otherwise return `false`.
    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(Self::Value)) -> bool;

    /// Cancel delivery for `token`.
    fn unsubscribe(&self, token: SubscriptionToken);
}

impl<S: Subscribable + ?Sized> Subscribable for Rc<S> {
    type Value = S::Value;

    fn source_id(&self) -> SourceId {
        (**self).source_id()
    }

    fn subscribe(&self, on_next: Callback<Self::Value>) -> Result<SubscriptionToken, ReactiveError> {
        (**self).subscribe(on_next)
    }

    fn try_deliver_current(&self, token: SubscriptionToken, on_next: &dyn Fn(Self::Value)) -> bool {
        (**self).try_deliver_current(token, on_next)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        (**self).unsubscribe(token)
    }
}

// ---------------------------------------------------------------------------
// SubscribableExt
// ---------------------------------------------------------------------------

/// Convenience methods available on every [`Subscribable`].
pub trait SubscribableExt: Subscribable + Sized + 'static {
    /// Derive a deduplicated source by mapping every value through `f`.
    ///
    /// Method form of [`sub`](crate::combinator::sub).
    fn map<U, F>(self, f: F) -> Sub<Self, U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(Self::Value) -> U + 'static,
    {
        crate::combinator::sub(self, f)
    }

    /// Subscribe a plain closure.
    fn listen(&self, f: impl Fn(Self::Value) + 'static) -> Result<SubscriptionToken, ReactiveError> {
        self.subscribe(Rc::new(f))
    }

    /// Type-erase this source behind an `Rc<dyn Subscribable>`.
    fn boxed(self) -> Rc<dyn Subscribable<Value = Self::Value>> {
        Rc::new(self)
    }
}

impl<S: Subscribable + 'static> SubscribableExt for S {}
