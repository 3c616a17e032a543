//! Wires generation and filtering together and shapes the output arrays.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{NegativeSamplingConfig, SamplingPlan};
use crate::constants::sampler::{LOG_PREFIX, STEP_SEED_OFFSET};
use crate::data::{CandidateBatch, Fact, LabelBatch, LabelKind, Layout, Slot, SourceOrder};
use crate::dataset::IndexProvider;
use crate::errors::SamplingError;
use crate::filter::{FilterContext, FilterImplementation, FilterReport, FilterResampler};
use crate::generator::{RawCandidates, SampleGenerator};
use crate::registry::SamplerRegistry;
use crate::rng::DeterministicRng;
use crate::types::{Id, LabelValue};

/// Candidates and labels for one slot of one batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleOutput {
    pub candidates: CandidateBatch,
    pub labels: LabelBatch,
    /// Present when filtering ran for this slot.
    pub filter: Option<FilterReport>,
}

/// Several slot outputs stacked row-wise into one loss input.
///
/// Stacking head and tail corruptions of a B-fact batch gives a 2B-row matrix whose
/// labels repeat once per block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StackedOutput {
    /// Per-slot candidate blocks, in stacking order.
    pub blocks: Vec<CandidateBatch>,
    pub layout: Layout,
    /// Ids of every block, concatenated.
    pub ids: Vec<Id>,
    pub labels: LabelBatch,
    /// Reports of the blocks that were filtered.
    pub filters: Vec<FilterReport>,
}

impl StackedOutput {
    /// Stack `parts` in order. Parts must share a label kind and, for matrices, a
    /// column count.
    pub fn stack(parts: Vec<(Slot, SampleOutput)>) -> Result<Self, SamplingError> {
        let Some((_, first)) = parts.first() else {
            return Err(SamplingError::Configuration(
                "at least one slot output is required for stacking".to_string(),
            ));
        };
        let kind = first.labels.kind;
        let matrix_cols = match first.candidates.layout {
            Layout::Matrix { cols, .. } => Some(cols),
            Layout::Flat { .. } => None,
        };

        let mut rows = 0;
        let mut ids = Vec::new();
        let mut values = Vec::new();
        let mut blocks = Vec::with_capacity(parts.len());
        let mut filters = Vec::new();
        for (slot, part) in parts {
            if part.labels.kind != kind {
                return Err(SamplingError::Configuration(format!(
                    "cannot stack slot '{slot}' labelled {:?} onto {kind:?} blocks",
                    part.labels.kind
                )));
            }
            match (matrix_cols, part.candidates.layout) {
                (Some(cols), Layout::Matrix { rows: r, cols: c }) if c == cols => rows += r,
                (None, Layout::Flat { .. }) => {}
                (_, layout) => {
                    return Err(SamplingError::Configuration(format!(
                        "cannot stack slot '{slot}' with layout {layout:?}; blocks must be all flat or matrices of equal width"
                    )));
                }
            }
            ids.extend_from_slice(&part.candidates.ids);
            values.extend(part.labels.values);
            filters.extend(part.filter);
            blocks.push(part.candidates);
        }

        let layout = match matrix_cols {
            Some(cols) => Layout::Matrix { rows, cols },
            None => Layout::Flat { len: ids.len() },
        };
        Ok(Self {
            blocks,
            layout,
            ids,
            labels: LabelBatch {
                kind,
                layout,
                values,
            },
            filters,
        })
    }

    /// Corrupted facts for a scorer, in stacked order.
    pub fn corrupted_facts(&self, sources: &[Fact]) -> Result<Vec<Fact>, SamplingError> {
        let mut facts = Vec::with_capacity(self.ids.len());
        for block in &self.blocks {
            facts.extend(block.corrupted_facts(sources)?);
        }
        Ok(facts)
    }
}

/// Builds negative batches for a training loop.
pub struct BatchAssembler<D: IndexProvider> {
    plan: SamplingPlan,
    dataset: Arc<D>,
    generator: Box<dyn SampleGenerator>,
    resampler: FilterResampler,
    rng: DeterministicRng,
}

impl<D: IndexProvider> BatchAssembler<D> {
    /// Validate `config`, resolve its strategy, and pre-build filtering indexes.
    pub fn new(config: &NegativeSamplingConfig, dataset: Arc<D>) -> Result<Self, SamplingError> {
        Self::from_plan(config.resolve()?, dataset)
    }

    pub fn from_plan(plan: SamplingPlan, dataset: Arc<D>) -> Result<Self, SamplingError> {
        let generator = SamplerRegistry::default().create(&plan)?;
        // Build indexes up front so the first step (or every worker) does not.
        for slot in Slot::ALL {
            if plan.filters(slot) {
                dataset.index(plan.filter_split, slot)?;
            }
        }
        info!(
            "{} strategy '{}' (shared={}, as_matrix={}) num_samples s={} p={} o={} t={}, filtering {:?} on {} via {}",
            LOG_PREFIX,
            generator.name(),
            plan.shared,
            plan.as_matrix,
            plan.num_samples(Slot::Subject),
            plan.num_samples(Slot::Predicate),
            plan.num_samples(Slot::Object),
            plan.num_samples(Slot::Timestamp),
            plan.filter,
            plan.filter_split,
            plan.implementation
        );
        Ok(Self {
            resampler: FilterResampler::new(plan.implementation, plan.max_attempts),
            rng: DeterministicRng::new(plan.seed),
            plan,
            dataset,
            generator,
        })
    }

    pub fn plan(&self) -> &SamplingPlan {
        &self.plan
    }

    /// Filter implementation that will run next; `FastIfAvailable` until first resolved.
    pub fn filter_implementation(&self) -> FilterImplementation {
        self.resampler.implementation()
    }

    /// Name of the resolved strategy.
    pub fn strategy_name(&self) -> &str {
        self.generator.name()
    }

    /// Sample the configured number of candidates for `slot`.
    pub fn sample(&mut self, facts: &[Fact], slot: Slot) -> Result<SampleOutput, SamplingError> {
        self.sample_with(facts, slot, None)
    }

    /// Sample `slot` with an optional per-call K; `None` or 0 uses the configured K.
    pub fn sample_with(
        &mut self,
        facts: &[Fact],
        slot: Slot,
        num_samples: Option<usize>,
    ) -> Result<SampleOutput, SamplingError> {
        let num_samples = match num_samples {
            Some(k) if k > 0 => k,
            _ => self.plan.num_samples(slot),
        };
        if self.plan.as_matrix && !self.generator.supports_matrix() {
            return Err(SamplingError::Unsupported(format!(
                "strategy '{}' does not produce matrix output",
                self.generator.name()
            )));
        }
        if !self.plan.as_matrix && !self.generator.supports_flat() {
            return Err(SamplingError::Unsupported(format!(
                "strategy '{}' does not produce flat output",
                self.generator.name()
            )));
        }

        let vocab = self.dataset.vocabulary_size(slot);
        let step_seed = self.rng.next_u64() ^ STEP_SEED_OFFSET;
        let mut step_rng = DeterministicRng::new(step_seed);
        let mut raw = self
            .generator
            .generate(facts, slot, vocab, num_samples, &mut step_rng)?;

        let filter = if self.plan.filters(slot) {
            let index = self.dataset.index(self.plan.filter_split, slot)?;
            let ctx = FilterContext {
                generator: self.generator.as_ref(),
                facts,
                slot,
                vocab,
                index: &index,
                step_seed,
            };
            let report = self.resampler.filter(&mut raw, &ctx)?;
            self.resampler.pin(report.implementation);
            debug!(
                "{} slot '{}': resampled {} of {} candidates via {} (max {} rounds)",
                LOG_PREFIX,
                slot,
                report.resampled,
                raw.ids.len(),
                report.implementation,
                report.max_rounds
            );
            Some(report)
        } else {
            None
        };

        let (candidates, labels) = shape(
            raw,
            facts,
            slot,
            self.generator.label_kind(),
            self.plan.as_matrix,
        )?;
        Ok(SampleOutput {
            candidates,
            labels,
            filter,
        })
    }

    /// Sample every slot whose configured K is positive, in tuple order.
    pub fn sample_configured(
        &mut self,
        facts: &[Fact],
    ) -> Result<Vec<(Slot, SampleOutput)>, SamplingError> {
        let slots: Vec<Slot> = Slot::ALL
            .into_iter()
            .filter(|slot| self.plan.num_samples(*slot) > 0)
            .collect();
        slots
            .into_iter()
            .map(|slot| Ok((slot, self.sample(facts, slot)?)))
            .collect()
    }

    /// Sample `slots` in order and stack them row-wise, e.g. subject then object
    /// corruptions as a single 2B-row loss input.
    pub fn sample_stacked(
        &mut self,
        facts: &[Fact],
        slots: &[Slot],
    ) -> Result<StackedOutput, SamplingError> {
        let parts = slots
            .iter()
            .map(|slot| Ok((*slot, self.sample(facts, *slot)?)))
            .collect::<Result<Vec<_>, SamplingError>>()?;
        StackedOutput::stack(parts)
    }
}

fn shape(
    raw: RawCandidates,
    facts: &[Fact],
    slot: Slot,
    kind: LabelKind,
    as_matrix: bool,
) -> Result<(CandidateBatch, LabelBatch), SamplingError> {
    let RawCandidates {
        rows,
        cols,
        reserved,
        ids,
    } = raw;

    let mut values: Vec<LabelValue> = vec![0.0; ids.len()];
    match kind {
        LabelKind::ReservedPositiveColumn | LabelKind::LeadingPositiveRows if reserved > 0 => {
            for row in 0..rows {
                values[row * cols] = 1.0;
            }
        }
        LabelKind::OneHot => {
            for (row, fact) in facts.iter().enumerate() {
                let original = fact.require(slot)?;
                if original >= cols {
                    return Err(SamplingError::Configuration(format!(
                        "fact {fact:?} has id {original} in slot '{slot}' outside vocabulary of size {cols}"
                    )));
                }
                values[row * cols + original] = 1.0;
            }
        }
        _ => {}
    }

    if kind == LabelKind::LeadingPositiveRows {
        // Column-major: all originals first, then one block of B negatives per draw.
        let ids = transpose(&ids, rows, cols);
        let values = transpose(&values, rows, cols);
        let layout = Layout::Flat { len: ids.len() };
        return Ok((
            CandidateBatch {
                slot,
                layout,
                order: SourceOrder::Cycled { sources: rows },
                ids,
            },
            LabelBatch {
                kind,
                layout,
                values,
            },
        ));
    }

    let layout = if as_matrix {
        Layout::Matrix { rows, cols }
    } else {
        Layout::Flat { len: ids.len() }
    };
    Ok((
        CandidateBatch {
            slot,
            layout,
            order: SourceOrder::Contiguous { per_source: cols },
            ids,
        },
        LabelBatch {
            kind,
            layout,
            values,
        },
    ))
}

fn transpose<T: Copy>(values: &[T], rows: usize, cols: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for col in 0..cols {
        for row in 0..rows {
            out.push(values[row * cols + col]);
        }
    }
    out
}
