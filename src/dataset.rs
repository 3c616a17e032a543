//! Dataset collaborator contracts and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::data::{Fact, Slot};
use crate::errors::SamplingError;
use crate::index::{IndexCache, PositiveIndex};
use crate::splits::SplitLabel;
use crate::types::{Id, VocabLabel};

/// Vocabulary sizes per slot kind.
pub trait Vocabulary {
    fn num_entities(&self) -> usize;
    fn num_relations(&self) -> usize;
    fn num_timestamps(&self) -> usize;

    /// Size of the id space of `slot`.
    fn vocabulary_size(&self, slot: Slot) -> usize {
        match slot {
            Slot::Subject | Slot::Object => self.num_entities(),
            Slot::Predicate => self.num_relations(),
            Slot::Timestamp => self.num_timestamps(),
        }
    }
}

/// Source of positive indexes used for filtering.
///
/// Implementations build each (split, slot) index at most once and hand out shared
/// read-only handles afterwards.
pub trait IndexProvider: Vocabulary + Send + Sync {
    fn index(&self, split: SplitLabel, slot: Slot) -> Result<Arc<PositiveIndex>, SamplingError>;
}

/// Fixed vocabulary sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VocabularySizes {
    pub entities: usize,
    pub relations: usize,
    pub timestamps: usize,
}

impl Vocabulary for VocabularySizes {
    fn num_entities(&self) -> usize {
        self.entities
    }

    fn num_relations(&self) -> usize {
        self.relations
    }

    fn num_timestamps(&self) -> usize {
        self.timestamps
    }
}

/// In-memory facts per split with a lazily populated index cache.
#[derive(Debug)]
pub struct FactDataset {
    sizes: VocabularySizes,
    splits: HashMap<SplitLabel, Vec<Fact>>,
    cache: IndexCache,
}

impl FactDataset {
    pub fn new(sizes: VocabularySizes) -> Self {
        Self {
            sizes,
            splits: HashMap::new(),
            cache: IndexCache::new(),
        }
    }

    /// Attach the facts of `split`, checking every id against the vocabulary.
    pub fn with_split(
        mut self,
        split: SplitLabel,
        facts: Vec<Fact>,
    ) -> Result<Self, SamplingError> {
        for fact in &facts {
            for slot in Slot::ALL {
                if let Some(id) = fact.get(slot)
                    && id >= self.sizes.vocabulary_size(slot)
                {
                    return Err(SamplingError::Configuration(format!(
                        "{split} fact {fact:?}: id {id} in slot '{slot}' exceeds vocabulary {}",
                        self.sizes.vocabulary_size(slot)
                    )));
                }
            }
        }
        self.splits.insert(split, facts);
        Ok(self)
    }

    /// Facts of `split`; empty when the split was never attached.
    pub fn facts(&self, split: SplitLabel) -> &[Fact] {
        self.splits.get(&split).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sizes(&self) -> VocabularySizes {
        self.sizes
    }

    /// Index cache owned by this dataset.
    pub fn index_cache(&self) -> &IndexCache {
        &self.cache
    }
}

impl Vocabulary for FactDataset {
    fn num_entities(&self) -> usize {
        self.sizes.entities
    }

    fn num_relations(&self) -> usize {
        self.sizes.relations
    }

    fn num_timestamps(&self) -> usize {
        self.sizes.timestamps
    }
}

impl IndexProvider for FactDataset {
    fn index(&self, split: SplitLabel, slot: Slot) -> Result<Arc<PositiveIndex>, SamplingError> {
        self.cache
            .get_or_build(split, slot, || PositiveIndex::build(self.facts(split), slot))
    }
}

/// Interns raw labels into dense ids in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct VocabularyBuilder {
    entities: IndexMap<VocabLabel, Id>,
    relations: IndexMap<VocabLabel, Id>,
    timestamps: IndexMap<VocabLabel, Id>,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(map: &mut IndexMap<VocabLabel, Id>, label: &str) -> Id {
        if let Some(id) = map.get(label) {
            return *id;
        }
        let id = map.len();
        map.insert(label.to_string(), id);
        id
    }

    pub fn entity(&mut self, label: &str) -> Id {
        Self::intern(&mut self.entities, label)
    }

    pub fn relation(&mut self, label: &str) -> Id {
        Self::intern(&mut self.relations, label)
    }

    pub fn timestamp(&mut self, label: &str) -> Id {
        Self::intern(&mut self.timestamps, label)
    }

    /// Intern a labelled fact; `timestamp` is optional for static triples.
    pub fn fact(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        timestamp: Option<&str>,
    ) -> Fact {
        Fact {
            subject: self.entity(subject),
            predicate: self.relation(predicate),
            object: self.entity(object),
            timestamp: timestamp.map(|ts| self.timestamp(ts)),
        }
    }

    /// Label interned as entity `id`.
    pub fn entity_label(&self, id: Id) -> Option<&str> {
        self.entities.get_index(id).map(|(label, _)| label.as_str())
    }

    /// Label interned as relation `id`.
    pub fn relation_label(&self, id: Id) -> Option<&str> {
        self.relations.get_index(id).map(|(label, _)| label.as_str())
    }

    pub fn sizes(&self) -> VocabularySizes {
        VocabularySizes {
            entities: self.entities.len(),
            relations: self.relations.len(),
            timestamps: self.timestamps.len(),
        }
    }
}

impl Vocabulary for VocabularyBuilder {
    fn num_entities(&self) -> usize {
        self.entities.len()
    }

    fn num_relations(&self) -> usize {
        self.relations.len()
    }

    fn num_timestamps(&self) -> usize {
        self.timestamps.len()
    }
}
