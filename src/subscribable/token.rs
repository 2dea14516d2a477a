//! Subscription tokens and source identities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::new_key_type;

new_key_type! {
    /// Handle for a single subscription. Copy, lightweight (u64).
    ///
    /// Tokens are only meaningful to the source that issued them; a stale or
    /// foreign token is ignored by `unsubscribe`.
    pub struct SubscriptionToken;
}

/// Process-unique identity of a value source.
///
/// Cloned handles share the id of the node they point at, which is what the
/// cell engine keys its dependency generations on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;

    #[test]
    fn source_ids_are_unique() {
        let a = SourceId::next();
        let b = SourceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn source_id_display() {
        let id = SourceId::next();
        assert_eq!(id.to_string(), format!("#{}", id.as_u64()));
    }

    #[test]
    fn default_token_is_null() {
        assert!(SubscriptionToken::default().is_null());
    }
}
