//! Candidate generators for a corrupted slot.
//!
//! Every generator produces a B×(reserved+K) matrix of raw ids. `reserved` is 1 when
//! the strategy keeps the original value of the slot in column 0, and 0 otherwise.
//! [`crate::assembler::BatchAssembler`] turns that matrix into the final candidate and
//! label arrays.

use std::fmt;

use rand::Rng;
use rand::seq::index;

use crate::constants::strategies::{ATISE_TIME, NO_SAMPLING, TIME_AGNOSTIC, UNIFORM};
use crate::data::{Fact, LabelKind, Query, Slot};
use crate::dataset::Vocabulary;
use crate::errors::SamplingError;
use crate::rng::DeterministicRng;
use crate::types::Id;

/// Raw generator output before shaping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCandidates {
    /// Number of source facts.
    pub rows: usize,
    /// Columns per row, reserved column included.
    pub cols: usize,
    /// Leading columns holding the original value (0 or 1).
    pub reserved: usize,
    /// Row-major ids.
    pub ids: Vec<Id>,
}

impl RawCandidates {
    /// Full row `i`, reserved column included.
    pub fn row(&self, i: usize) -> &[Id] {
        &self.ids[i * self.cols..(i + 1) * self.cols]
    }

    /// Negative part of row `i`.
    pub fn negatives(&self, i: usize) -> &[Id] {
        &self.row(i)[self.reserved..]
    }

    /// Negatives per row.
    pub fn num_negatives(&self) -> usize {
        self.cols - self.reserved
    }
}

/// A candidate-generation strategy for one slot.
///
/// `draw` is the single source of fresh ids: `generate` builds rows from it and the
/// filter calls it again to replace collisions, so replacements follow the same
/// distribution as the original draws.
pub trait SampleGenerator: Send + Sync + fmt::Debug {
    /// Registered strategy name.
    fn name(&self) -> &str;

    /// Whether column 0 of every row holds the original value.
    fn reserves_positive(&self) -> bool {
        false
    }

    /// Label semantics attached to the generated candidates.
    fn label_kind(&self) -> LabelKind {
        LabelKind::ImplicitNegative
    }

    /// Whether one-row-per-fact output is implemented.
    fn supports_matrix(&self) -> bool {
        true
    }

    /// Whether flattened output is implemented.
    fn supports_flat(&self) -> bool {
        true
    }

    /// Whether the strategy can corrupt `slot` at all.
    fn corrupts(&self, _slot: Slot) -> bool {
        true
    }

    /// Whether one draw can be broadcast across the batch.
    fn supports_shared(&self) -> bool {
        false
    }

    /// Whether draws are independent of the row, which the bulk filter relies on.
    fn supports_bulk_filter(&self) -> bool {
        false
    }

    /// `count` fresh ids for `fact` in `[0, vocab)`.
    fn draw(
        &self,
        fact: &Fact,
        slot: Slot,
        vocab: usize,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError>;

    /// `count` ids drawn once for a whole batch.
    fn draw_shared(
        &self,
        slot: Slot,
        _vocab: usize,
        _count: usize,
        _with_replacement: bool,
        _rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        Err(SamplingError::Unsupported(format!(
            "strategy '{}' cannot draw shared candidates for slot '{slot}'",
            self.name()
        )))
    }

    /// Candidates for every fact of the batch.
    fn generate(
        &self,
        facts: &[Fact],
        slot: Slot,
        vocab: usize,
        num_samples: usize,
        rng: &mut DeterministicRng,
    ) -> Result<RawCandidates, SamplingError> {
        let reserved = usize::from(self.reserves_positive());
        let cols = reserved + num_samples;
        let mut ids = Vec::with_capacity(facts.len() * cols);
        for fact in facts {
            if reserved == 1 {
                ids.push(fact.require(slot)?);
            }
            ids.extend(self.draw(fact, slot, vocab, num_samples, rng)?);
        }
        Ok(RawCandidates {
            rows: facts.len(),
            cols,
            reserved,
            ids,
        })
    }
}

fn ensure_vocab(
    slot: Slot,
    vocab: usize,
    count: usize,
    minimum: usize,
) -> Result<(), SamplingError> {
    if count > 0 && vocab < minimum {
        return Err(SamplingError::Exhausted {
            slot,
            row: 0,
            attempts: 0,
            details: format!(
                "vocabulary of size {vocab} cannot supply candidates (need at least {minimum})"
            ),
        });
    }
    Ok(())
}

/// Independent uniform ids per row.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uniform;

impl SampleGenerator for Uniform {
    fn name(&self) -> &str {
        UNIFORM
    }

    fn supports_shared(&self) -> bool {
        true
    }

    fn supports_bulk_filter(&self) -> bool {
        true
    }

    fn draw(
        &self,
        _fact: &Fact,
        slot: Slot,
        vocab: usize,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        ensure_vocab(slot, vocab, count, 1)?;
        Ok((0..count).map(|_| rng.random_range(0..vocab)).collect())
    }

    fn draw_shared(
        &self,
        slot: Slot,
        vocab: usize,
        count: usize,
        with_replacement: bool,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        if with_replacement {
            ensure_vocab(slot, vocab, count, 1)?;
            return Ok((0..count).map(|_| rng.random_range(0..vocab)).collect());
        }
        ensure_vocab(slot, vocab, count, count)?;
        Ok(index::sample(rng, vocab, count).into_vec())
    }
}

/// `(original + offset) mod vocab` with a non-zero offset; column 0 keeps the original.
///
/// A negative equals the original only when `offset ≡ 0 (mod vocab)`, which offsets drawn
/// from `[1, vocab)` never are.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModuloOffset;

impl SampleGenerator for ModuloOffset {
    fn name(&self) -> &str {
        TIME_AGNOSTIC
    }

    fn reserves_positive(&self) -> bool {
        true
    }

    fn label_kind(&self) -> LabelKind {
        LabelKind::ReservedPositiveColumn
    }

    fn draw(
        &self,
        fact: &Fact,
        slot: Slot,
        vocab: usize,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        ensure_vocab(slot, vocab, count, 2)?;
        let original = fact.require(slot)?;
        Ok((0..count)
            .map(|_| (original + rng.random_range(1..vocab)) % vocab)
            .collect())
    }
}

/// Uniform timestamp corruption; positives lead the flattened output.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeResample;

impl SampleGenerator for TimeResample {
    fn name(&self) -> &str {
        ATISE_TIME
    }

    fn reserves_positive(&self) -> bool {
        true
    }

    fn label_kind(&self) -> LabelKind {
        LabelKind::LeadingPositiveRows
    }

    fn supports_matrix(&self) -> bool {
        false
    }

    fn corrupts(&self, slot: Slot) -> bool {
        slot == Slot::Timestamp
    }

    fn draw(
        &self,
        _fact: &Fact,
        slot: Slot,
        vocab: usize,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        if !self.corrupts(slot) {
            return Err(SamplingError::Unsupported(format!(
                "strategy '{ATISE_TIME}' only corrupts the timestamp slot, not '{slot}'"
            )));
        }
        ensure_vocab(slot, vocab, count, 1)?;
        Ok((0..count).map(|_| rng.random_range(0..vocab)).collect())
    }
}

/// Every id of the vocabulary for every fact.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullEnumeration;

impl SampleGenerator for FullEnumeration {
    fn name(&self) -> &str {
        NO_SAMPLING
    }

    fn label_kind(&self) -> LabelKind {
        LabelKind::OneHot
    }

    fn supports_flat(&self) -> bool {
        false
    }

    fn draw(
        &self,
        _fact: &Fact,
        slot: Slot,
        _vocab: usize,
        _count: usize,
        _rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        Err(SamplingError::Unsupported(format!(
            "strategy '{NO_SAMPLING}' enumerates slot '{slot}' and cannot draw replacements"
        )))
    }

    fn generate(
        &self,
        facts: &[Fact],
        slot: Slot,
        vocab: usize,
        _num_samples: usize,
        _rng: &mut DeterministicRng,
    ) -> Result<RawCandidates, SamplingError> {
        let mut ids = Vec::with_capacity(facts.len() * vocab);
        for fact in facts {
            fact.require(slot)?;
            ids.extend(0..vocab);
        }
        Ok(RawCandidates {
            rows: facts.len(),
            cols: vocab,
            reserved: 0,
            ids,
        })
    }
}

/// One draw of the wrapped generator broadcast to all rows.
#[derive(Debug)]
pub struct SharedAcrossBatch {
    inner: Box<dyn SampleGenerator>,
    with_replacement: bool,
}

impl SharedAcrossBatch {
    pub fn new(
        inner: Box<dyn SampleGenerator>,
        with_replacement: bool,
    ) -> Result<Self, SamplingError> {
        if !inner.supports_shared() {
            return Err(SamplingError::Configuration(format!(
                "strategy '{}' does not support shared negative sampling",
                inner.name()
            )));
        }
        Ok(Self {
            inner,
            with_replacement,
        })
    }

    pub fn with_replacement(&self) -> bool {
        self.with_replacement
    }
}

impl SampleGenerator for SharedAcrossBatch {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn label_kind(&self) -> LabelKind {
        self.inner.label_kind()
    }

    fn corrupts(&self, slot: Slot) -> bool {
        self.inner.corrupts(slot)
    }

    fn supports_shared(&self) -> bool {
        true
    }

    fn draw(
        &self,
        fact: &Fact,
        slot: Slot,
        vocab: usize,
        count: usize,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        self.inner.draw(fact, slot, vocab, count, rng)
    }

    fn draw_shared(
        &self,
        slot: Slot,
        vocab: usize,
        count: usize,
        with_replacement: bool,
        rng: &mut DeterministicRng,
    ) -> Result<Vec<Id>, SamplingError> {
        self.inner.draw_shared(slot, vocab, count, with_replacement, rng)
    }

    fn generate(
        &self,
        facts: &[Fact],
        slot: Slot,
        vocab: usize,
        num_samples: usize,
        rng: &mut DeterministicRng,
    ) -> Result<RawCandidates, SamplingError> {
        let shared = self
            .inner
            .draw_shared(slot, vocab, num_samples, self.with_replacement, rng)?;
        let mut ids = Vec::with_capacity(facts.len() * num_samples);
        for _ in facts {
            ids.extend_from_slice(&shared);
        }
        Ok(RawCandidates {
            rows: facts.len(),
            cols: num_samples,
            reserved: 0,
            ids,
        })
    }
}

/// Expand ranking queries with one open slot into every completion over the vocabulary.
///
/// Query `i` owns facts `i * vocab .. (i + 1) * vocab`, in id order.
pub fn enumerate_queries(
    queries: &[Query],
    vocabulary: &impl Vocabulary,
) -> Result<Vec<Fact>, SamplingError> {
    let mut facts = Vec::new();
    for query in queries {
        let slot = query.missing_slot()?;
        let vocab = vocabulary.vocabulary_size(slot);
        facts.reserve(vocab);
        facts.extend((0..vocab).map(|id| query.complete(slot, id)));
    }
    Ok(facts)
}
