//! `Recorder<T>`: collects emitted values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::subscribable::Callback;

/// Collects every value delivered to the callbacks it hands out.
///
/// Cloning shares the same log.
pub struct Recorder<T> {
    log: Rc<RefCell<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: Rc::clone(&self.log),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("log", &self.log.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A callback appending to this recorder's log.
    pub fn callback(&self) -> Callback<T> {
        let log = self.log.clone();
        Rc::new(move |value| log.borrow_mut().push(value))
    }

    /// Everything recorded so far.
    pub fn values(&self) -> Vec<T> {
        self.log.borrow().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    /// Number of recorded values.
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }
}

impl<T: Clone + 'static> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}
