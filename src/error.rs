//! Error type shared by every reactive node.

use std::any::Any;

use crate::subscribable::SourceId;

/// Errors raised by the reactive core.
///
/// Only [`ReactiveError::CircularDependency`] ever reaches the caller of
/// `subscribe`; everything else raised inside a cell's thunk is absorbed by
/// the recompute, which keeps the previous value.
///
/// There is no "read outside a recompute" error: a [`ReadCx`] only exists
/// as a borrow handed to a running thunk, so it cannot outlive the recompute.
///
/// [`ReadCx`]: crate::cell::ReadCx
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// A dependency was read before it delivered any value.
    #[error("no value available yet")]
    NoValueYet,
    /// A computation (transitively) requires its own in-progress result.
    #[error("circular dependency detected")]
    CircularDependency,
    /// A generation entry held a value of an unexpected type.
    #[error("value recorded for source {source_id} has an unexpected type")]
    TypeMismatch { source_id: SourceId },
    /// The thunk reported a failure of its own.
    #[error("computation failed: {0}")]
    Compute(String),
    /// The thunk panicked.
    #[error("computation panicked: {0}")]
    Panicked(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Compute`] from any displayable message.
    pub fn compute(message: impl std::fmt::Display) -> Self {
        Self::Compute(message.to_string())
    }

    /// Whether this error must be surfaced instead of absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CircularDependency)
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
