//! Creatures a client already has cached
//!
//! The first time a creature is sent it goes out with its full description;
//! after that a short "known" record is enough. A set built with a capacity
//! behaves like the client's own cache and evicts its oldest entry when
//! full. Unbounded sets only ever grow.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::game::creature::CreatureId;

/// Outcome of marking a creature as known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownCheck {
    /// Already cached, send the short form
    Known,
    /// Newly cached, send the full form. `evicted` is the id the client
    /// must drop to make room.
    Added { evicted: Option<CreatureId> },
}

#[derive(Debug, Clone, Default)]
pub struct KnownCreatureSet {
    ids: FxHashSet<CreatureId>,
    /// Insertion order, oldest first
    order: VecDeque<CreatureId>,
    capacity: Option<usize>,
}

impl KnownCreatureSet {
    /// A set that never evicts
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A set that evicts its oldest entry past `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: FxHashSet::default(),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn contains(&self, id: CreatureId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in the order they became known
    pub fn iter(&self) -> impl Iterator<Item = CreatureId> + '_ {
        self.order.iter().copied()
    }

    /// Mark `id` as known and report whether it already was
    pub fn check_as_known(&mut self, id: CreatureId) -> KnownCheck {
        if !self.ids.insert(id) {
            return KnownCheck::Known;
        }
        self.order.push_back(id);

        let evicted = match self.capacity {
            Some(capacity) if self.order.len() > capacity => {
                let oldest = self.order.pop_front();
                if let Some(oldest) = oldest {
                    self.ids.remove(&oldest);
                }
                oldest
            }
            _ => None,
        };
        KnownCheck::Added { evicted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_check_adds_then_known() {
        let mut set = KnownCreatureSet::unbounded();
        assert_eq!(set.check_as_known(101), KnownCheck::Added { evicted: None });
        assert_eq!(set.check_as_known(101), KnownCheck::Known);
        assert!(set.contains(101));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut set = KnownCreatureSet::unbounded();
        for id in 0..5000 {
            assert_eq!(set.check_as_known(id), KnownCheck::Added { evicted: None });
        }
        assert_eq!(set.len(), 5000);
        assert!(set.contains(0));
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut set = KnownCreatureSet::with_capacity(3);
        set.check_as_known(1);
        set.check_as_known(2);
        set.check_as_known(3);
        // re-checking does not refresh the entry
        assert_eq!(set.check_as_known(1), KnownCheck::Known);

        assert_eq!(set.check_as_known(4), KnownCheck::Added { evicted: Some(1) });
        assert!(!set.contains(1));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut set = KnownCreatureSet::unbounded();
        for id in [202, 101, 303] {
            set.check_as_known(id);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![202, 101, 303]);
    }
}
