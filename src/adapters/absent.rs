//! `Absent<T>`: the source standing in for "no source at all".

use std::fmt;
use std::marker::PhantomData;

use crate::error::ReactiveError;
use crate::subscribable::{Callback, SourceId, Subscribable, SubscriptionToken};

/// A source that never registers anyone and never delivers.
///
/// Reading it from a cell yields the default (or `NoValueYet`) forever.
pub struct Absent<T> {
    id: SourceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Absent<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Absent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Absent").field("id", &self.id).finish()
    }
}

impl<T> Absent<T> {
    pub fn new() -> Self {
        Self {
            id: SourceId::next(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Absent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Subscribable for Absent<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.id
    }

    fn subscribe(&self, _on_next: Callback<T>) -> Result<SubscriptionToken, ReactiveError> {
        Ok(SubscriptionToken::default())
    }

    fn try_deliver_current(&self, _token: SubscriptionToken, _on_next: &dyn Fn(T)) -> bool {
        false
    }

    fn unsubscribe(&self, _token: SubscriptionToken) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribable::SubscribableExt;

    #[test]
    fn never_delivers() {
        let absent: Absent<i32> = Absent::new();
        let token = absent.listen(|_| panic!("absent source delivered")).unwrap();
        assert!(!absent.try_deliver_current(token, &|_| panic!("absent source delivered")));
        absent.unsubscribe(token);
    }

    #[test]
    fn each_absent_has_its_own_identity() {
        let a: Absent<u8> = Absent::new();
        let b: Absent<u8> = Absent::default();
        assert_ne!(a.source_id(), b.source_id());
        assert_eq!(a.source_id(), a.clone().source_id());
    }
}
