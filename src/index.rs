//! Exact-membership index from a context pair to the ids that truly fill the target slot.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::constants::sampler::LOG_PREFIX;
use crate::data::{Fact, PairKind, Slot};
use crate::errors::SamplingError;
use crate::splits::SplitLabel;
use crate::types::{ContextPair, Id};

/// Context pair → sorted, deduplicated ids occupying the target slot.
///
/// Immutable once built; share it behind an `Arc` between rows and workers.
#[derive(Debug, Clone)]
pub struct PositiveIndex {
    slot: Slot,
    kind: PairKind,
    entries: HashMap<ContextPair, Box<[Id]>>,
}

impl PositiveIndex {
    /// Scan `facts` and collect, per context pair, every id found in `slot`.
    ///
    /// The timestamp slot has no pair kind and cannot be indexed.
    pub fn build(facts: &[Fact], slot: Slot) -> Result<Self, SamplingError> {
        let kind = PairKind::for_slot(slot).ok_or_else(|| {
            SamplingError::Unsupported(format!("no positive index is defined for slot '{slot}'"))
        })?;
        let mut grouped: HashMap<ContextPair, Vec<Id>> = HashMap::new();
        for fact in facts {
            let target = fact.require(slot)?;
            grouped.entry(fact.context(kind)).or_default().push(target);
        }
        let entries = grouped
            .into_iter()
            .map(|(pair, mut ids)| {
                ids.sort_unstable();
                ids.dedup();
                (pair, ids.into_boxed_slice())
            })
            .collect();
        Ok(Self {
            slot,
            kind,
            entries,
        })
    }

    /// Positives for `pair`; empty when the pair never occurs.
    pub fn lookup(&self, pair: ContextPair) -> &[Id] {
        self.entries.get(&pair).map(|ids| &ids[..]).unwrap_or(&[])
    }

    /// Whether `id` is a true occupant of the target slot for `pair`.
    pub fn contains(&self, pair: ContextPair, id: Id) -> bool {
        self.lookup(pair).binary_search(&id).is_ok()
    }

    /// Context pair of `fact` under this index's pair kind.
    pub fn context_of(&self, fact: &Fact) -> ContextPair {
        fact.context(self.kind)
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn pair_kind(&self) -> PairKind {
        self.kind
    }

    /// Number of distinct context pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of (pair, id) entries.
    pub fn num_positives(&self) -> usize {
        self.entries.values().map(|ids| ids.len()).sum()
    }
}

/// Build-once, read-many cache of positive indexes keyed by (split, slot).
///
/// An index is inserted only after its build returns, so a build that panics leaves the
/// map unchanged and a poisoned lock is recovered rather than reported.
#[derive(Debug, Default)]
pub struct IndexCache {
    indexes: RwLock<HashMap<(SplitLabel, Slot), Arc<PositiveIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached index or run `build` on first access.
    pub fn get_or_build(
        &self,
        split: SplitLabel,
        slot: Slot,
        build: impl FnOnce() -> Result<PositiveIndex, SamplingError>,
    ) -> Result<Arc<PositiveIndex>, SamplingError> {
        if let Some(index) = self.cached(split, slot) {
            return Ok(index);
        }
        let mut guard = self
            .indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another reader may have built it while we waited for the write lock.
        if let Some(index) = guard.get(&(split, slot)) {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(build()?);
        info!(
            "{} built {}_{}_to_{} index: {} pairs, {} positives",
            LOG_PREFIX,
            split,
            index.pair_kind().as_str(),
            slot,
            index.len(),
            index.num_positives()
        );
        guard.insert((split, slot), Arc::clone(&index));
        Ok(index)
    }

    /// Cached index, if already built.
    pub fn cached(&self, split: SplitLabel, slot: Slot) -> Option<Arc<PositiveIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(split, slot))
            .cloned()
    }

    /// Number of built indexes.
    pub fn len(&self) -> usize {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> Vec<Fact> {
        vec![
            Fact::triple(0, 0, 1),
            Fact::triple(0, 0, 3),
            Fact::triple(0, 0, 1),
            Fact::triple(2, 0, 1),
            Fact::triple(1, 1, 2),
        ]
    }

    #[test]
    fn build_groups_targets_by_context_pair() {
        let index = PositiveIndex::build(&facts(), Slot::Object).expect("index");
        assert_eq!(index.pair_kind(), PairKind::Sp);
        assert_eq!(index.lookup((0, 0)), &[1, 3]);
        assert_eq!(index.lookup((1, 1)), &[2]);
        assert!(index.contains((2, 0), 1));
        assert!(!index.contains((2, 0), 3));
        assert_eq!(index.len(), 3);
        assert_eq!(index.num_positives(), 4);
    }

    #[test]
    fn subject_index_uses_predicate_object_pairs() {
        let index = PositiveIndex::build(&facts(), Slot::Subject).expect("index");
        assert_eq!(index.lookup((0, 1)), &[0, 2]);
        assert_eq!(index.context_of(&Fact::triple(9, 0, 1)), (0, 1));
    }

    #[test]
    fn absent_pair_yields_empty_set() {
        let index = PositiveIndex::build(&facts(), Slot::Predicate).expect("index");
        assert!(index.lookup((42, 42)).is_empty());
        assert!(!index.contains((42, 42), 0));
    }

    #[test]
    fn timestamp_slot_has_no_index() {
        let err = PositiveIndex::build(&facts(), Slot::Timestamp).expect_err("no pair kind");
        assert!(err.is_unsupported());
    }

    #[test]
    fn cache_survives_a_panicking_build() {
        let cache = IndexCache::new();
        cache
            .get_or_build(SplitLabel::Train, Slot::Subject, || {
                PositiveIndex::build(&facts(), Slot::Subject)
            })
            .expect("subject index");
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cache.get_or_build(SplitLabel::Train, Slot::Object, || {
                panic!("build failed");
            });
        }));
        assert!(panicked.is_err());
        assert!(cache.indexes.is_poisoned());

        assert_eq!(cache.len(), 1);
        assert!(cache.cached(SplitLabel::Train, Slot::Subject).is_some());
        assert!(cache.cached(SplitLabel::Train, Slot::Object).is_none());
        let object = cache
            .get_or_build(SplitLabel::Train, Slot::Object, || {
                PositiveIndex::build(&facts(), Slot::Object)
            })
            .expect("object index after poison");
        assert_eq!(object.lookup((0, 0)), &[1, 3]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_builds_once_per_split_and_slot() {
        let cache = IndexCache::new();
        let mut builds = 0;
        let first = cache
            .get_or_build(SplitLabel::Train, Slot::Object, || {
                builds += 1;
                PositiveIndex::build(&facts(), Slot::Object)
            })
            .expect("first");
        let second = cache
            .get_or_build(SplitLabel::Train, Slot::Object, || {
                builds += 1;
                PositiveIndex::build(&facts(), Slot::Object)
            })
            .expect("second");
        assert_eq!(builds, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.cached(SplitLabel::Test, Slot::Object).is_none());
        assert_eq!(cache.len(), 1);
    }
}
