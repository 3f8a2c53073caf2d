use std::collections::BTreeMap;

use crate::physics::object::ObjectKey;
use crate::scene::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactPhase {
    Start,
    Stay,
    Stop,
}

/// Triggers only receive trigger events and solid objects only collision events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactChannel {
    Collision,
    Trigger,
}

/// Contact lifecycle event delivered to `object` about `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub channel: ContactChannel,
    pub object: ObjectKey,
    pub other: ObjectKey,
    pub owner: ObjectId,
    pub other_owner: ObjectId,
}

/// Outcome of reporting a touching pair during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairTouch {
    /// Pair was not tracked yet.
    New,
    /// First report of an already tracked pair in this step.
    Refreshed,
    /// Pair was already reported in this step.
    Repeated,
}

/// Touching pairs keyed by their canonical (smaller, larger) handle order, with a flag telling
/// whether contact was reported during the current step.
#[derive(Debug, Default, Clone)]
pub struct CollisionTable {
    pairs: BTreeMap<(ObjectKey, ObjectKey), bool>,
}

impl CollisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonical(a: ObjectKey, b: ObjectKey) -> (ObjectKey, ObjectKey) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Clears every refreshed flag ahead of a step.
    pub fn reset(&mut self) {
        for refreshed in self.pairs.values_mut() {
            *refreshed = false;
        }
    }

    pub fn touch(&mut self, a: ObjectKey, b: ObjectKey) -> PairTouch {
        match self.pairs.get_mut(&Self::canonical(a, b)) {
            None => {
                self.pairs.insert(Self::canonical(a, b), true);
                PairTouch::New
            }
            Some(refreshed) if !*refreshed => {
                *refreshed = true;
                PairTouch::Refreshed
            }
            Some(_) => PairTouch::Repeated,
        }
    }

    /// Removes and returns every pair not refreshed since the last reset.
    pub fn take_stale(&mut self) -> Vec<(ObjectKey, ObjectKey)> {
        let stale: Vec<_> = self
            .pairs
            .iter()
            .filter(|(_, refreshed)| !**refreshed)
            .map(|(pair, _)| *pair)
            .collect();
        for pair in &stale {
            self.pairs.remove(pair);
        }
        stale
    }

    /// Forgets every pair involving `object`.
    pub fn remove_object(&mut self, object: ObjectKey) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|(a, b), _| *a != object && *b != object);
        before - self.pairs.len()
    }

    pub fn contains(&self, a: ObjectKey, b: ObjectKey) -> bool {
        self.pairs.contains_key(&Self::canonical(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_order_does_not_matter() {
        let mut table = CollisionTable::new();
        let (a, b) = (ObjectKey::new(3, 0), ObjectKey::new(1, 0));
        assert_eq!(table.touch(a, b), PairTouch::New);
        assert_eq!(table.touch(b, a), PairTouch::Repeated);
        assert!(table.contains(b, a));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unrefreshed_pairs_go_stale() {
        let mut table = CollisionTable::new();
        let (a, b, c) = (ObjectKey::new(0, 0), ObjectKey::new(1, 0), ObjectKey::new(2, 0));
        table.touch(a, b);
        table.touch(a, c);
        table.reset();
        assert_eq!(table.touch(a, b), PairTouch::Refreshed);
        assert_eq!(table.take_stale(), vec![(a, c)]);
        assert!(!table.contains(a, c));
        assert_eq!(table.remove_object(b), 1);
        assert!(table.is_empty());
    }
}
