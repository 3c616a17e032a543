//! Rejection resampling of candidates that coincide with true facts.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::filtering::{IMPL_FAST, IMPL_FAST_IF_AVAILABLE, IMPL_STANDARD};
use crate::constants::sampler::LOG_PREFIX;
use crate::data::{Fact, Slot};
use crate::errors::SamplingError;
use crate::generator::{RawCandidates, SampleGenerator};
use crate::hash::row_seed;
use crate::index::PositiveIndex;
use crate::rng::DeterministicRng;
use crate::types::{ContextPair, Id};

/// Which filter implementation to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterImplementation {
    /// Per-row lookups, sequential.
    Standard,
    /// Batch lookup table, rows in parallel.
    Fast,
    /// Fast when the generator supports it, standard otherwise.
    FastIfAvailable,
}

impl FilterImplementation {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterImplementation::Standard => IMPL_STANDARD,
            FilterImplementation::Fast => IMPL_FAST,
            FilterImplementation::FastIfAvailable => IMPL_FAST_IF_AVAILABLE,
        }
    }
}

impl fmt::Display for FilterImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterImplementation {
    type Err = SamplingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            IMPL_STANDARD => Ok(FilterImplementation::Standard),
            IMPL_FAST => Ok(FilterImplementation::Fast),
            IMPL_FAST_IF_AVAILABLE => Ok(FilterImplementation::FastIfAvailable),
            other => Err(SamplingError::Configuration(format!(
                "filter implementation '{other}' is not supported (expected one of {IMPL_STANDARD}, {IMPL_FAST}, {IMPL_FAST_IF_AVAILABLE})"
            ))),
        }
    }
}

/// What a filter pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Implementation that actually ran (never `FastIfAvailable`).
    pub implementation: FilterImplementation,
    /// Candidates that collided with a positive and were replaced.
    pub resampled: usize,
    /// Largest number of resample rounds any row needed.
    pub max_rounds: usize,
}

/// Everything a filter pass reads besides the candidates themselves.
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub generator: &'a dyn SampleGenerator,
    pub facts: &'a [Fact],
    pub slot: Slot,
    pub vocab: usize,
    pub index: &'a PositiveIndex,
    /// Per-step seed; row `i` resamples with an RNG seeded from `(step_seed, i)`.
    pub step_seed: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct RowStats {
    resampled: usize,
    rounds: usize,
}

/// Replaces candidates found in the positive index until every row is clean.
#[derive(Clone, Copy, Debug)]
pub struct FilterResampler {
    implementation: FilterImplementation,
    max_attempts: usize,
}

impl FilterResampler {
    pub fn new(implementation: FilterImplementation, max_attempts: usize) -> Self {
        Self {
            implementation,
            max_attempts,
        }
    }

    /// Configured (or, after the first fallback decision, pinned) implementation.
    pub fn implementation(&self) -> FilterImplementation {
        self.implementation
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Filter with the configured implementation.
    ///
    /// `FastIfAvailable` tries the bulk path and falls back to the per-row path only on
    /// [`SamplingError::Unsupported`]; any other error propagates. The report names the
    /// implementation that ran.
    pub fn filter(
        &self,
        candidates: &mut RawCandidates,
        ctx: &FilterContext<'_>,
    ) -> Result<FilterReport, SamplingError> {
        match self.implementation {
            FilterImplementation::Standard => self.filter_standard(candidates, ctx),
            FilterImplementation::Fast => self.filter_fast(candidates, ctx),
            FilterImplementation::FastIfAvailable => match self.filter_fast(candidates, ctx) {
                Err(err) if err.is_unsupported() => {
                    warn!(
                        "{} fast filtering unavailable for strategy '{}' ({}); using standard",
                        LOG_PREFIX,
                        ctx.generator.name(),
                        err
                    );
                    self.filter_standard(candidates, ctx)
                }
                other => other,
            },
        }
    }

    /// Pin `FastIfAvailable` to the implementation that ran, so later steps skip the
    /// availability check.
    pub fn pin(&mut self, ran: FilterImplementation) {
        if self.implementation == FilterImplementation::FastIfAvailable {
            self.implementation = ran;
        }
    }

    /// Per-row path: look up each row's positives and resample in place.
    pub fn filter_standard(
        &self,
        candidates: &mut RawCandidates,
        ctx: &FilterContext<'_>,
    ) -> Result<FilterReport, SamplingError> {
        check_shape(candidates, ctx)?;
        let mut report = empty_report(FilterImplementation::Standard);
        if candidates.rows == 0 || candidates.num_negatives() == 0 {
            return Ok(report);
        }
        let reserved = candidates.reserved;
        for (row_idx, row) in candidates.ids.chunks_mut(candidates.cols).enumerate() {
            let fact = &ctx.facts[row_idx];
            let positives = ctx.index.lookup(ctx.index.context_of(fact));
            let stats = self.resample_row(row, reserved, row_idx, positives, ctx)?;
            merge(&mut report, stats);
        }
        Ok(report)
    }

    /// Bulk path: one lookup table for the batch's context pairs, rows in parallel.
    ///
    /// Rows use the same per-row RNG as the standard path, so both produce identical
    /// candidates. Only generators whose draws do not depend on the row qualify.
    pub fn filter_fast(
        &self,
        candidates: &mut RawCandidates,
        ctx: &FilterContext<'_>,
    ) -> Result<FilterReport, SamplingError> {
        if !ctx.generator.supports_bulk_filter() {
            return Err(SamplingError::Unsupported(format!(
                "fast filtering is not implemented for strategy '{}'",
                ctx.generator.name()
            )));
        }
        check_shape(candidates, ctx)?;
        let mut report = empty_report(FilterImplementation::Fast);
        if candidates.rows == 0 || candidates.num_negatives() == 0 {
            return Ok(report);
        }

        let pairs: Vec<ContextPair> = ctx
            .facts
            .iter()
            .map(|fact| ctx.index.context_of(fact))
            .collect();
        let mut table: HashMap<ContextPair, &[Id]> = HashMap::with_capacity(pairs.len());
        for pair in &pairs {
            table
                .entry(*pair)
                .or_insert_with(|| ctx.index.lookup(*pair));
        }

        let reserved = candidates.reserved;
        let stats = candidates
            .ids
            .par_chunks_mut(candidates.cols)
            .enumerate()
            .map(|(row_idx, row)| {
                let positives = table.get(&pairs[row_idx]).copied().unwrap_or(&[]);
                self.resample_row(row, reserved, row_idx, positives, ctx)
            })
            .collect::<Result<Vec<_>, _>>()?;
        for row in stats {
            merge(&mut report, row);
        }
        Ok(report)
    }

    fn resample_row(
        &self,
        row: &mut [Id],
        reserved: usize,
        row_idx: usize,
        positives: &[Id],
        ctx: &FilterContext<'_>,
    ) -> Result<RowStats, SamplingError> {
        let is_positive = |id: &Id| positives.binary_search(id).is_ok();
        let original = if reserved > 0 { row.first().copied() } else { None };
        let negatives = &mut row[reserved..];

        let mut pending: Vec<usize> = negatives
            .iter()
            .enumerate()
            .filter(|(_, id)| is_positive(id))
            .map(|(pos, _)| pos)
            .collect();
        if pending.is_empty() {
            return Ok(RowStats::default());
        }

        let excluded = positives.len()
            + usize::from(original.is_some_and(|id| !is_positive(&id)));
        if ctx.vocab <= excluded {
            return Err(SamplingError::Exhausted {
                slot: ctx.slot,
                row: row_idx,
                attempts: 0,
                details: format!(
                    "vocabulary of size {} leaves no candidate outside {} excluded ids",
                    ctx.vocab, excluded
                ),
            });
        }

        let fact = &ctx.facts[row_idx];
        let mut rng = DeterministicRng::new(row_seed(ctx.step_seed, row_idx));
        let resampled = pending.len();
        let mut rounds = 0;
        while !pending.is_empty() {
            if rounds == self.max_attempts {
                return Err(SamplingError::Exhausted {
                    slot: ctx.slot,
                    row: row_idx,
                    attempts: rounds,
                    details: format!("{} candidates still collide with positives", pending.len()),
                });
            }
            rounds += 1;
            let fresh = ctx
                .generator
                .draw(fact, ctx.slot, ctx.vocab, pending.len(), &mut rng)?;
            let mut written = 0;
            for (pos, id) in pending
                .iter()
                .zip(fresh.into_iter().filter(|id| !is_positive(id)))
            {
                negatives[*pos] = id;
                written += 1;
            }
            pending.drain(..written);
        }
        Ok(RowStats { resampled, rounds })
    }
}

/// Number of negative candidates that are positives of their row's context.
pub fn count_collisions(
    candidates: &RawCandidates,
    facts: &[Fact],
    index: &PositiveIndex,
) -> usize {
    (0..candidates.rows)
        .map(|row| {
            let pair = index.context_of(&facts[row]);
            candidates
                .negatives(row)
                .iter()
                .filter(|id| index.contains(pair, **id))
                .count()
        })
        .sum()
}

fn check_shape(candidates: &RawCandidates, ctx: &FilterContext<'_>) -> Result<(), SamplingError> {
    if candidates.rows != ctx.facts.len() {
        return Err(SamplingError::Configuration(format!(
            "candidate matrix has {} rows but {} facts were given",
            candidates.rows,
            ctx.facts.len()
        )));
    }
    if ctx.index.slot() != ctx.slot {
        return Err(SamplingError::Configuration(format!(
            "positive index for slot '{}' cannot filter slot '{}'",
            ctx.index.slot(),
            ctx.slot
        )));
    }
    Ok(())
}

fn empty_report(implementation: FilterImplementation) -> FilterReport {
    FilterReport {
        implementation,
        resampled: 0,
        max_rounds: 0,
    }
}

fn merge(report: &mut FilterReport, row: RowStats) {
    report.resampled += row.resampled;
    report.max_rounds = report.max_rounds.max(row.rounds);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ModuloOffset, Uniform};

    fn index() -> PositiveIndex {
        PositiveIndex::build(
            &[Fact::triple(0, 0, 1), Fact::triple(1, 0, 2), Fact::triple(1, 0, 3)],
            Slot::Object,
        )
        .expect("index")
    }

    fn raw(ids: Vec<Id>, rows: usize, reserved: usize) -> RawCandidates {
        RawCandidates {
            rows,
            cols: ids.len() / rows,
            reserved,
            ids,
        }
    }

    #[test]
    fn implementation_names_parse() {
        assert_eq!(
            "fast_if_available".parse::<FilterImplementation>().expect("impl"),
            FilterImplementation::FastIfAvailable
        );
        let err = "numba".parse::<FilterImplementation>().expect_err("unknown");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("numba"));
    }

    #[test]
    fn standard_removes_collisions() {
        let index = index();
        let facts = [Fact::triple(0, 0, 1), Fact::triple(1, 0, 2)];
        let mut candidates = raw(vec![1, 1, 0, 4, 2, 3, 2, 0], 2, 0);
        let ctx = FilterContext {
            generator: &Uniform,
            facts: &facts,
            slot: Slot::Object,
            vocab: 5,
            index: &index,
            step_seed: 11,
        };
        let report = FilterResampler::new(FilterImplementation::Standard, 100)
            .filter(&mut candidates, &ctx)
            .expect("filtered");
        assert_eq!(report.implementation, FilterImplementation::Standard);
        assert_eq!(report.resampled, 5);
        assert_eq!(count_collisions(&candidates, &facts, &index), 0);
        assert_eq!(candidates.row(0)[2..], [0, 4]);
        assert_eq!(candidates.row(1)[3], 0);
    }

    #[test]
    fn fast_matches_standard() {
        let index = index();
        let facts = vec![Fact::triple(0, 0, 1), Fact::triple(1, 0, 2)].repeat(8);
        let mut rng = DeterministicRng::new(4);
        let original = Uniform
            .generate(&facts, Slot::Object, 5, 12, &mut rng)
            .expect("raw");
        let ctx = FilterContext {
            generator: &Uniform,
            facts: &facts,
            slot: Slot::Object,
            vocab: 5,
            index: &index,
            step_seed: 99,
        };
        let resampler = FilterResampler::new(FilterImplementation::Standard, 100);
        let mut standard = original.clone();
        let mut fast = original.clone();
        let a = resampler.filter_standard(&mut standard, &ctx).expect("standard");
        let b = resampler.filter_fast(&mut fast, &ctx).expect("fast");
        assert_eq!(standard, fast);
        assert_eq!(a.resampled, b.resampled);
        assert_eq!(b.implementation, FilterImplementation::Fast);
    }

    #[test]
    fn fast_if_available_falls_back_for_row_dependent_generators() {
        let index = index();
        let facts = [Fact::triple(1, 0, 2)];
        let mut candidates = raw(vec![2, 3, 3, 0], 1, 1);
        let ctx = FilterContext {
            generator: &ModuloOffset,
            facts: &facts,
            slot: Slot::Object,
            vocab: 5,
            index: &index,
            step_seed: 3,
        };
        let mut resampler = FilterResampler::new(FilterImplementation::FastIfAvailable, 100);
        assert!(
            resampler
                .filter_fast(&mut candidates.clone(), &ctx)
                .expect_err("no fast path")
                .is_unsupported()
        );
        let report = resampler.filter(&mut candidates, &ctx).expect("filtered");
        assert_eq!(report.implementation, FilterImplementation::Standard);
        assert_eq!(candidates.row(0)[0], 2);
        assert!(candidates.negatives(0).iter().all(|id| *id == 0 || *id == 1 || *id == 4));
        resampler.pin(report.implementation);
        assert_eq!(resampler.implementation(), FilterImplementation::Standard);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let index = index();
        let facts = [Fact::triple(1, 0, 2)];
        let mut candidates = raw(vec![2, 3, 2, 3, 0], 1, 0);
        let ctx = FilterContext {
            generator: &Uniform,
            facts: &facts,
            slot: Slot::Object,
            vocab: 5,
            index: &index,
            step_seed: 5,
        };
        let resampler = FilterResampler::new(FilterImplementation::Fast, 100);
        resampler.filter(&mut candidates, &ctx).expect("first");
        let once = candidates.clone();
        let report = resampler.filter(&mut candidates, &ctx).expect("second");
        assert_eq!(report.resampled, 0);
        assert_eq!(candidates, once);
    }

    #[test]
    fn exhausted_vocabulary_is_reported() {
        let index = index();
        let facts = [Fact::triple(1, 0, 2)];
        let mut candidates = raw(vec![2, 3], 1, 0);
        let ctx = FilterContext {
            generator: &Uniform,
            facts: &facts,
            slot: Slot::Object,
            vocab: 4,
            index: &index,
            step_seed: 5,
        };
        // 2 and 3 are positives; 0 and 1 remain.
        FilterResampler::new(FilterImplementation::Standard, 1000)
            .filter(&mut candidates, &ctx)
            .expect("two clean ids remain");

        // Every id is a positive.
        let mut candidates = raw(vec![0, 1], 1, 0);
        let tight = PositiveIndex::build(
            &[Fact::triple(1, 0, 0), Fact::triple(1, 0, 1)],
            Slot::Object,
        )
        .expect("index");
        let ctx = FilterContext {
            vocab: 2,
            index: &tight,
            ..ctx
        };
        let err = FilterResampler::new(FilterImplementation::Standard, 1000)
            .filter(&mut candidates, &ctx)
            .expect_err("exhausted");
        assert!(matches!(err, SamplingError::Exhausted { row: 0, .. }));
    }

    #[test]
    fn attempt_cap_bounds_the_loop() {
        let index = index();
        let facts = [Fact::triple(1, 0, 2)];
        let mut candidates = raw(vec![2; 64], 1, 0);
        let ctx = FilterContext {
            generator: &Uniform,
            facts: &facts,
            slot: Slot::Object,
            vocab: 1000,
            index: &index,
            step_seed: 5,
        };
        let err = FilterResampler::new(FilterImplementation::Standard, 0)
            .filter(&mut candidates, &ctx)
            .expect_err("no attempts allowed");
        assert!(matches!(err, SamplingError::Exhausted { attempts: 0, .. }));
    }
}
