//! Derived-value combinators.
//!
//! - [`sub`] — map one source through a function, emitting only on change.
//! - [`sub_all`] — fan in many sources into one deduplicated value.
//!
//! Extra arguments to the mapping function are simply captured by the
//! closure:
//!
//! ```ignore
//! let scale = 3;
//! let scaled = sub(count.clone(), move |n| n * scale);
//! let total = sub_all(vec![a, b], |xs| xs.iter().flatten().sum::<i32>());
//! ```

pub mod sub;
pub mod sub_all;

pub use sub::{sub, Sub};
pub use sub_all::{sub_all, SubAll};

use std::cell::RefCell;

/// Record `value` as the latest emission.
///
/// Returns `false` (and leaves the record alone) when it equals the previous one.
pub(crate) fn replace_if_changed<U: Clone + PartialEq>(last: &RefCell<Option<U>>, value: &U) -> bool {
    let mut last = last.borrow_mut();
    if last.as_ref() == Some(value) {
        return false;
    }
    *last = Some(value.clone());
    true
}
