use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SamplingError;

pub use crate::types::{ContextPair, Id, LabelValue};

/// One position of a fact tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    Subject,
    Predicate,
    Object,
    Timestamp,
}

impl Slot {
    /// All slots in tuple order.
    pub const ALL: [Slot; 4] = [Slot::Subject, Slot::Predicate, Slot::Object, Slot::Timestamp];

    /// Position of the slot inside a fact tuple.
    pub fn index(self) -> usize {
        match self {
            Slot::Subject => 0,
            Slot::Predicate => 1,
            Slot::Object => 2,
            Slot::Timestamp => 3,
        }
    }

    /// Short configuration key (`s`, `p`, `o`, `t`).
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Subject => "s",
            Slot::Predicate => "p",
            Slot::Object => "o",
            Slot::Timestamp => "t",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = SamplingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "s" | "subject" | "head" => Ok(Slot::Subject),
            "p" | "predicate" | "relation" => Ok(Slot::Predicate),
            "o" | "object" | "tail" => Ok(Slot::Object),
            "t" | "timestamp" | "time" => Ok(Slot::Timestamp),
            other => Err(SamplingError::Configuration(format!(
                "unknown slot '{other}' (expected one of s, p, o, t)"
            ))),
        }
    }
}

/// Which two slots form the context of an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PairKind {
    /// Predicate and object (target: subject).
    Po,
    /// Subject and object (target: predicate).
    So,
    /// Subject and predicate (target: object).
    Sp,
}

impl PairKind {
    /// Pair kind used to filter corruptions of `slot`; timestamps have none.
    pub fn for_slot(slot: Slot) -> Option<PairKind> {
        match slot {
            Slot::Subject => Some(PairKind::Po),
            Slot::Predicate => Some(PairKind::So),
            Slot::Object => Some(PairKind::Sp),
            Slot::Timestamp => None,
        }
    }

    /// Slots making up the pair, in tuple order.
    pub fn slots(self) -> (Slot, Slot) {
        match self {
            PairKind::Po => (Slot::Predicate, Slot::Object),
            PairKind::So => (Slot::Subject, Slot::Object),
            PairKind::Sp => (Slot::Subject, Slot::Predicate),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PairKind::Po => "po",
            PairKind::So => "so",
            PairKind::Sp => "sp",
        }
    }
}

/// A true (or corrupted) fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub subject: Id,
    pub predicate: Id,
    pub object: Id,
    /// Absent for static (non-temporal) triples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Id>,
}

impl Fact {
    /// Static triple.
    pub fn triple(subject: Id, predicate: Id, object: Id) -> Self {
        Self {
            subject,
            predicate,
            object,
            timestamp: None,
        }
    }

    /// Temporal quadruple.
    pub fn quad(subject: Id, predicate: Id, object: Id, timestamp: Id) -> Self {
        Self {
            subject,
            predicate,
            object,
            timestamp: Some(timestamp),
        }
    }

    /// Id in `slot`, `None` for a missing timestamp.
    pub fn get(&self, slot: Slot) -> Option<Id> {
        match slot {
            Slot::Subject => Some(self.subject),
            Slot::Predicate => Some(self.predicate),
            Slot::Object => Some(self.object),
            Slot::Timestamp => self.timestamp,
        }
    }

    /// Copy of this fact with `slot` replaced by `id`.
    pub fn with(&self, slot: Slot, id: Id) -> Self {
        let mut fact = *self;
        match slot {
            Slot::Subject => fact.subject = id,
            Slot::Predicate => fact.predicate = id,
            Slot::Object => fact.object = id,
            Slot::Timestamp => fact.timestamp = Some(id),
        }
        fact
    }

    /// The two ids held fixed for `kind`.
    pub fn context(&self, kind: PairKind) -> ContextPair {
        match kind {
            PairKind::Po => (self.predicate, self.object),
            PairKind::So => (self.subject, self.object),
            PairKind::Sp => (self.subject, self.predicate),
        }
    }

    /// Id in `slot`, failing for a timestamp slot on a static triple.
    pub fn require(&self, slot: Slot) -> Result<Id, SamplingError> {
        self.get(slot).ok_or_else(|| {
            SamplingError::Unsupported(format!(
                "fact {self:?} has no value for slot '{slot}'"
            ))
        })
    }
}

/// A fact with exactly one slot left open, used for exhaustive ranking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub subject: Option<Id>,
    pub predicate: Option<Id>,
    pub object: Option<Id>,
    #[serde(default)]
    pub timestamp: Option<Id>,
}

impl Query {
    /// Slot left open. Static queries never report the timestamp as missing.
    pub fn missing_slot(&self) -> Result<Slot, SamplingError> {
        let missing: Vec<Slot> = [
            (Slot::Subject, self.subject),
            (Slot::Predicate, self.predicate),
            (Slot::Object, self.object),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(slot, _)| slot)
        .collect();
        match missing.as_slice() {
            [slot] => Ok(*slot),
            [] => Err(SamplingError::Unsupported(format!(
                "query {self:?} has no missing slot"
            ))),
            _ => Err(SamplingError::Unsupported(format!(
                "query {self:?} has more than one missing slot"
            ))),
        }
    }

    /// Complete the query by placing `id` into the missing slot.
    pub fn complete(&self, slot: Slot, id: Id) -> Fact {
        Fact {
            subject: self.subject.unwrap_or(id),
            predicate: self.predicate.unwrap_or(id),
            object: self.object.unwrap_or(id),
            timestamp: self.timestamp,
        }
        .with(slot, id)
    }
}

/// Output arrangement of a candidate or label array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// One row per source fact.
    Matrix { rows: usize, cols: usize },
    /// Single flattened sequence.
    Flat { len: usize },
}

impl Layout {
    pub fn len(&self) -> usize {
        match *self {
            Layout::Matrix { rows, cols } => rows * cols,
            Layout::Flat { len } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Candidate slot ids for one slot of one batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBatch {
    /// Slot the ids belong to.
    pub slot: Slot,
    pub layout: Layout,
    /// Mapping from positions back to source facts.
    pub order: SourceOrder,
    /// Row-major ids.
    pub ids: Vec<Id>,
}

impl CandidateBatch {
    /// Row `i` of a matrix batch; `None` for flat batches or out of range rows.
    pub fn row(&self, i: usize) -> Option<&[Id]> {
        match self.layout {
            Layout::Matrix { rows, cols } if i < rows => Some(&self.ids[i * cols..(i + 1) * cols]),
            _ => None,
        }
    }

    /// Number of rows (1 for a flat batch).
    pub fn rows(&self) -> usize {
        match self.layout {
            Layout::Matrix { rows, .. } => rows,
            Layout::Flat { .. } => 1,
        }
    }

    /// Number of columns (the sequence length for a flat batch).
    pub fn cols(&self) -> usize {
        match self.layout {
            Layout::Matrix { cols, .. } => cols,
            Layout::Flat { len } => len,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Corrupted facts for a scorer, in candidate order.
    ///
    /// `sources` must be the positives the batch was generated from.
    pub fn corrupted_facts(&self, sources: &[Fact]) -> Result<Vec<Fact>, SamplingError> {
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }
        let expected = match self.order {
            SourceOrder::Contiguous { per_source } => self.ids.len() / per_source.max(1),
            SourceOrder::Cycled { sources } => sources,
        };
        if expected != sources.len() {
            return Err(SamplingError::Configuration(format!(
                "candidate batch was built from {expected} facts but {} were given",
                sources.len()
            )));
        }
        Ok(self
            .ids
            .iter()
            .enumerate()
            .map(|(pos, id)| {
                let source = match self.order {
                    SourceOrder::Contiguous { per_source } => pos / per_source.max(1),
                    SourceOrder::Cycled { sources } => pos % sources,
                };
                sources[source].with(self.slot, *id)
            })
            .collect())
    }
}

/// How candidate positions map back onto the source facts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrder {
    /// Each source owns `per_source` consecutive positions.
    Contiguous { per_source: usize },
    /// Positions walk through the `sources` facts in order, then repeat.
    Cycled { sources: usize },
}

/// How label values relate to candidate positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    /// First column of every row is the positive.
    ReservedPositiveColumn,
    /// Leading rows hold the positives, the rest are negatives.
    LeadingPositiveRows,
    /// One-hot row over the full vocabulary.
    OneHot,
    /// Every candidate is a negative.
    ImplicitNegative,
}

/// Labels parallel to a [`CandidateBatch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelBatch {
    pub kind: LabelKind,
    pub layout: Layout,
    pub values: Vec<LabelValue>,
}

impl LabelBatch {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of positive entries.
    pub fn positives(&self) -> usize {
        self.values.iter().filter(|value| **value > 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trips_through_config_keys() {
        for slot in Slot::ALL {
            assert_eq!(slot.as_str().parse::<Slot>().expect("slot"), slot);
        }
        assert!("x".parse::<Slot>().is_err());
    }

    #[test]
    fn pair_kind_context_excludes_target_slot() {
        let fact = Fact::quad(1, 2, 3, 4);
        assert_eq!(fact.context(PairKind::for_slot(Slot::Subject).expect("po")), (2, 3));
        assert_eq!(fact.context(PairKind::for_slot(Slot::Predicate).expect("so")), (1, 3));
        assert_eq!(fact.context(PairKind::for_slot(Slot::Object).expect("sp")), (1, 2));
        assert!(PairKind::for_slot(Slot::Timestamp).is_none());
        assert_eq!(PairKind::Sp.slots(), (Slot::Subject, Slot::Predicate));
    }

    #[test]
    fn fact_with_replaces_only_target_slot() {
        let fact = Fact::triple(1, 2, 3);
        assert_eq!(fact.with(Slot::Object, 9), Fact::triple(1, 2, 9));
        assert_eq!(fact.with(Slot::Timestamp, 5).timestamp, Some(5));
        assert!(fact.require(Slot::Timestamp).is_err());
    }

    #[test]
    fn query_requires_exactly_one_missing_slot() {
        let query = Query {
            subject: Some(1),
            predicate: Some(0),
            object: None,
            timestamp: Some(3),
        };
        assert_eq!(query.missing_slot().expect("missing"), Slot::Object);
        assert_eq!(query.complete(Slot::Object, 7), Fact::quad(1, 0, 7, 3));

        let full = Query {
            object: Some(2),
            ..query
        };
        assert!(full.missing_slot().is_err());
        let two = Query {
            subject: None,
            ..query
        };
        assert!(two.missing_slot().is_err());
    }

    #[test]
    fn corrupted_facts_follow_rows() {
        let batch = CandidateBatch {
            slot: Slot::Object,
            layout: Layout::Matrix { rows: 2, cols: 2 },
            order: SourceOrder::Contiguous { per_source: 2 },
            ids: vec![4, 5, 6, 7],
        };
        let facts = batch
            .corrupted_facts(&[Fact::triple(0, 0, 1), Fact::triple(1, 0, 2)])
            .expect("facts");
        assert_eq!(facts[1], Fact::triple(0, 0, 5));
        assert_eq!(facts[2], Fact::triple(1, 0, 6));
        assert_eq!(batch.row(1), Some(&[6, 7][..]));
        assert!(batch.corrupted_facts(&[Fact::triple(0, 0, 1)]).is_err());

        let cycled = CandidateBatch {
            slot: Slot::Timestamp,
            layout: Layout::Flat { len: 4 },
            order: SourceOrder::Cycled { sources: 2 },
            ids: vec![0, 1, 8, 9],
        };
        let facts = cycled
            .corrupted_facts(&[Fact::quad(0, 0, 1, 0), Fact::quad(1, 0, 2, 1)])
            .expect("facts");
        assert_eq!(facts[2], Fact::quad(0, 0, 1, 8));
        assert_eq!(facts[3], Fact::quad(1, 0, 2, 9));
    }
}
