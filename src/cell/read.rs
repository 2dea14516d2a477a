//! The dependency-read operator.
//!
//! A cell's thunk receives a [`ReadCx`] bound to that cell for the duration
//! of one recompute. Every read both returns the source's value and records
//! the source as a dependency of this round.

use std::any::Any;
use std::rc::Rc;

use super::generation::{Carried, Dependency};
use crate::error::ReactiveError;
use crate::subscribable::{SourceId, Subscribable};

/// Cell-side operations the read operator needs, erased over the cell's
/// value type.
pub(crate) trait Tracker {
    fn carry(&self, id: SourceId) -> Carried;
    fn adopt(&self, id: SourceId, dependency: Dependency);
    fn set_resolving(&self, id: Option<SourceId>);
    /// A closure routing upstream values to this cell's `deliver`.
    fn deliverer(&self, id: SourceId) -> Rc<dyn Fn(Rc<dyn Any>)>;
}

/// Read context handed to a cell's thunk.
///
/// ```ignore
/// let total = Cell::new(move |cx| Ok(cx.read(&x)? + cx.read_or(&y, 0)?));
/// ```
pub struct ReadCx<'a> {
    tracker: &'a dyn Tracker,
}

impl<'a> ReadCx<'a> {
    pub(crate) fn new(tracker: &'a dyn Tracker) -> Self {
        Self { tracker }
    }

    /// Read `source`, failing with [`ReactiveError::NoValueYet`] if it has
    /// not delivered anything.
    pub fn read<S>(&mut self, source: &S) -> Result<S::Value, ReactiveError>
    where
        S: Subscribable + Clone + 'static,
    {
        self.try_read(source)?.ok_or(ReactiveError::NoValueYet)
    }

    /// Read `source`, falling back to `default` if it has not delivered.
    pub fn read_or<S>(&mut self, source: &S, default: S::Value) -> Result<S::Value, ReactiveError>
    where
        S: Subscribable + Clone + 'static,
    {
        Ok(self.try_read(source)?.unwrap_or(default))
    }

    /// Read `source`, returning `None` if it has not delivered.
    ///
    /// The source is tracked as a dependency either way, so a later delivery
    /// triggers a recompute.
    pub fn try_read<S>(&mut self, source: &S) -> Result<Option<S::Value>, ReactiveError>
    where
        S: Subscribable + Clone + 'static,
    {
        let id = source.source_id();
        match self.tracker.carry(id) {
            Carried::Value(value) => return downcast(id, value).map(Some),
            Carried::Pending => return Ok(None),
            Carried::Missing => {}
        }

        // New dependency: subscribe for future values, then pick up the
        // current one while this source is marked as being resolved.
        let deliver = self.tracker.deliverer(id);
        let token = source.subscribe(Rc::new(move |x: S::Value| {
            deliver(Rc::new(x) as Rc<dyn Any>);
        }))?;
        let upstream = source.clone();
        self.tracker
            .adopt(id, Dependency::new(move || upstream.unsubscribe(token)));

        let deliver = self.tracker.deliverer(id);
        self.tracker.set_resolving(Some(id));
        source.try_deliver_current(token, &|x| deliver(Rc::new(x) as Rc<dyn Any>));
        self.tracker.set_resolving(None);

        match self.tracker.carry(id) {
            Carried::Value(value) => downcast(id, value).map(Some),
            Carried::Pending | Carried::Missing => Ok(None),
        }
    }
}

fn downcast<T: Clone + 'static>(id: SourceId, value: Rc<dyn Any>) -> Result<T, ReactiveError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(ReactiveError::TypeMismatch { source_id: id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Absent, Observable};
    use crate::cell::Cell;
    use crate::subscribable::SubscribableExt;
    use crate::testing::Probe;
    use pretty_assertions::assert_eq;

    #[test]
    fn read_or_falls_back_for_absent_source() {
        let absent = Absent::<i32>::new();
        let cell = Cell::new(move |cx| cx.read_or(&absent, 42));
        let token = cell.listen(|_| {}).unwrap();
        assert!(cell.try_deliver_current(token, &|v| assert_eq!(v, 42)));
        assert_eq!(cell.dependency_count(), 1);
    }

    #[test]
    fn read_without_default_fails_for_absent_source() {
        let absent = Absent::<i32>::new();
        let cell = Cell::new(move |cx| cx.read(&absent));
        let token = cell.listen(|_| {}).unwrap();
        assert!(!cell.try_deliver_current(token, &|_| {}));
    }

    #[test]
    fn try_read_reports_none() {
        let absent = Absent::<i32>::new();
        let cell = Cell::new(move |cx| Ok(cx.try_read(&absent)?.is_none()));
        let token = cell.listen(|_| {}).unwrap();
        assert!(cell.try_deliver_current(token, &|v| assert!(v)));
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let probe = Probe::new(Observable::new(2));
        let source = probe.clone();
        let cell = Cell::new(move |cx| {
            let a = cx.read(&source)?;
            let b = cx.read(&source)?;
            Ok(a * b)
        });
        let token = cell.listen(|_| {}).unwrap();
        assert!(cell.try_deliver_current(token, &|v| assert_eq!(v, 4)));
        assert_eq!(probe.subscribes(), 1);
        assert_eq!(probe.immediate_deliveries(), 1);
    }

    #[test]
    fn carried_dependency_is_not_resubscribed() {
        let probe = Probe::new(Observable::new(1));
        let source = probe.clone();
        let cell = Cell::new(move |cx| cx.read(&source));
        cell.listen(|_| {}).unwrap();
        probe.inner().set(2);
        probe.inner().set(3);
        assert_eq!(probe.subscribes(), 1);
        assert_eq!(probe.unsubscribes(), 0);
        assert_eq!(cell.peek(), Some(3));
    }
}
