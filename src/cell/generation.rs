//! Dependency generations: per-refresh bookkeeping of what a cell read.
//!
//! A cell keeps two maps. At rest `current` holds the live dependencies and
//! `retired` is an empty spare. A refresh swaps them, so the thunk fills a
//! fresh `current` while carrying entries forward out of `retired`. Whatever
//! is still in `retired` afterwards was not read this round and gets released.
//! The drained map then serves as the spare for the next round.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::subscribable::SourceId;

// ---------------------------------------------------------------------------
// Dependency
// ---------------------------------------------------------------------------

/// One upstream subscription held by a cell.
pub(crate) struct Dependency {
    /// Latest delivered value. `None` marks a subscription that has not
    /// delivered yet.
    value: Option<Rc<dyn Any>>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Dependency {
    /// A pending dependency; `release` cancels the upstream subscription.
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            value: None,
            release: Some(Box::new(release)),
        }
    }

    pub(crate) fn carried(&self) -> Carried {
        match &self.value {
            Some(value) => Carried::Value(value.clone()),
            None => Carried::Pending,
        }
    }

    /// Cancel the upstream subscription. Runs at most once.
    pub(crate) fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("has_value", &self.value.is_some())
            .finish()
    }
}

/// Result of looking a source up in the generations.
pub(crate) enum Carried {
    /// Read before (this round or the last) and holding a value.
    Value(Rc<dyn Any>),
    /// Subscribed but nothing delivered yet.
    Pending,
    /// Not a dependency in either generation.
    Missing,
}

// ---------------------------------------------------------------------------
// Generations
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct Generations {
    current: HashMap<SourceId, Dependency>,
    retired: HashMap<SourceId, Dependency>,
}

impl Generations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start a round: the live map becomes the old generation and the spare
    /// becomes the (empty) new one.
    pub(crate) fn begin_round(&mut self) {
        debug_assert!(self.retired.is_empty(), "spare generation not drained");
        mem::swap(&mut self.current, &mut self.retired);
    }

    /// Look `id` up, moving it from the old generation to the new one if
    /// needed. Never resubscribes.
    pub(crate) fn carry(&mut self, id: SourceId) -> Carried {
        if let Some(dep) = self.current.get(&id) {
            return dep.carried();
        }
        match self.retired.remove(&id) {
            Some(dep) => {
                let carried = dep.carried();
                self.current.insert(id, dep);
                carried
            }
            None => Carried::Missing,
        }
    }

    /// Add a brand-new dependency to the current generation.
    ///
    /// A dependency already registered under `id` is released.
    pub(crate) fn adopt(&mut self, id: SourceId, dependency: Dependency) {
        if let Some(previous) = self.current.insert(id, dependency) {
            previous.release();
        }
    }

    /// Store a delivered value. Returns `false` for unknown sources.
    pub(crate) fn record(&mut self, id: SourceId, value: Rc<dyn Any>) -> bool {
        match self.current.get_mut(&id) {
            Some(dep) => {
                dep.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Finish a round, handing back every dependency that was not read.
    ///
    /// The old generation keeps its capacity and becomes the next spare.
    pub(crate) fn end_round(&mut self) -> Vec<Dependency> {
        self.retired.drain().map(|(_, dep)| dep).collect()
    }

    /// Hand back every dependency (teardown).
    pub(crate) fn drain_all(&mut self) -> Vec<Dependency> {
        self.current
            .drain()
            .chain(self.retired.drain())
            .map(|(_, dep)| dep)
            .collect()
    }

    /// Number of live dependencies.
    pub(crate) fn len(&self) -> usize {
        self.current.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.current.is_empty() && self.retired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counted(counter: &Rc<Cell<usize>>) -> Dependency {
        let counter = counter.clone();
        Dependency::new(move || counter.set(counter.get() + 1))
    }

    fn value_of(carried: Carried) -> Option<i32> {
        match carried {
            Carried::Value(v) => v.downcast_ref::<i32>().copied(),
            _ => None,
        }
    }

    #[test]
    fn adopt_then_carry_within_round() {
        let mut gens = Generations::new();
        let id = SourceId::next();
        gens.begin_round();
        gens.adopt(id, Dependency::new(|| {}));
        assert!(matches!(gens.carry(id), Carried::Pending));
        assert!(gens.record(id, Rc::new(7_i32)));
        assert_eq!(value_of(gens.carry(id)), Some(7));
        assert!(gens.end_round().is_empty());
        assert_eq!(gens.len(), 1);
    }

    #[test]
    fn carry_moves_from_old_generation() {
        let released = Rc::new(Cell::new(0));
        let mut gens = Generations::new();
        let id = SourceId::next();
        gens.begin_round();
        gens.adopt(id, counted(&released));
        gens.record(id, Rc::new(1_i32));
        gens.end_round();

        gens.begin_round();
        assert_eq!(value_of(gens.carry(id)), Some(1));
        assert!(gens.end_round().is_empty());
        assert_eq!(released.get(), 0);
    }

    #[test]
    fn unread_dependencies_are_returned_once() {
        let released = Rc::new(Cell::new(0));
        let mut gens = Generations::new();
        let kept = SourceId::next();
        let dropped = SourceId::next();
        gens.begin_round();
        gens.adopt(kept, counted(&released));
        gens.adopt(dropped, counted(&released));
        gens.end_round();

        gens.begin_round();
        gens.carry(kept);
        let stale = gens.end_round();
        assert_eq!(stale.len(), 1);
        for dep in stale {
            dep.release();
        }
        assert_eq!(released.get(), 1);
        assert_eq!(gens.len(), 1);
    }

    #[test]
    fn missing_and_record_unknown() {
        let mut gens = Generations::new();
        let id = SourceId::next();
        gens.begin_round();
        assert!(matches!(gens.carry(id), Carried::Missing));
        assert!(!gens.record(id, Rc::new(1_i32)));
    }

    #[test]
    fn drain_all_empties_both_maps() {
        let released = Rc::new(Cell::new(0));
        let mut gens = Generations::new();
        gens.begin_round();
        gens.adopt(SourceId::next(), counted(&released));
        gens.adopt(SourceId::next(), counted(&released));
        gens.end_round();
        for dep in gens.drain_all() {
            dep.release();
        }
        assert_eq!(released.get(), 2);
        assert!(gens.is_empty());
    }
}
