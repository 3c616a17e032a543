use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::NUM_SAMPLES_PAIRS;
use crate::constants::filtering::{DEFAULT_MAX_ATTEMPTS, IMPL_FAST_IF_AVAILABLE};
use crate::constants::sampler::{DEFAULT_SEED, DEFAULT_STRATEGY, DEFAULT_TRAIN_SPLIT};
use crate::data::Slot;
use crate::errors::SamplingError;
use crate::filter::FilterImplementation;
use crate::generator::SampleGenerator;
use crate::registry::{SamplerRegistry, StrategyKind};
use crate::splits::SplitLabel;
use crate::types::StrategyName;

/// One value per slot, keyed `s`, `p`, `o`, `t` in configuration files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotValues<T> {
    pub s: T,
    pub p: T,
    pub o: T,
    pub t: T,
}

impl<T: Copy> SlotValues<T> {
    pub fn get(&self, slot: Slot) -> T {
        match slot {
            Slot::Subject => self.s,
            Slot::Predicate => self.p,
            Slot::Object => self.o,
            Slot::Timestamp => self.t,
        }
    }

    fn to_array(self) -> [T; 4] {
        [self.s, self.p, self.o, self.t]
    }
}

/// Filtering options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteringConfig {
    /// Split whose facts count as true; empty means the training split.
    pub split: String,
    /// `standard`, `fast`, or `fast_if_available`.
    pub implementation: String,
    /// Cap on resample rounds per row before reporting exhaustion.
    pub max_attempts: usize,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            split: String::new(),
            implementation: IMPL_FAST_IF_AVAILABLE.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Negative sampling configuration as written in a config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegativeSamplingConfig {
    /// Registered strategy name.
    pub name: StrategyName,
    /// Samples per slot; a negative value is derived from the paired slot (s ↔ o) or 0.
    pub num_samples: SlotValues<i64>,
    /// Whether to filter positives per slot.
    pub filter: SlotValues<bool>,
    pub filtering: FilteringConfig,
    /// One row per fact (`true`) or a single flattened sequence.
    pub as_matrix: bool,
    /// Broadcast one candidate vector across the batch.
    pub shared: bool,
    /// Must stay `true` unless `shared` is set.
    pub with_replacement: bool,
    /// RNG seed that controls deterministic sampling order.
    pub seed: u64,
    /// Name of the training split, used when `filtering.split` is empty.
    pub train_split: String,
}

impl Default for NegativeSamplingConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STRATEGY.to_string(),
            num_samples: SlotValues {
                s: 3,
                p: 0,
                o: -1,
                t: 0,
            },
            filter: SlotValues::default(),
            filtering: FilteringConfig::default(),
            as_matrix: true,
            shared: false,
            with_replacement: true,
            seed: DEFAULT_SEED,
            train_split: DEFAULT_TRAIN_SPLIT.to_string(),
        }
    }
}

impl NegativeSamplingConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, SamplingError> {
        serde_json::from_str(raw).map_err(|err| {
            SamplingError::Configuration(format!("invalid negative sampling config: {err}"))
        })
    }

    /// Read and parse a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SamplingError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validate every option and derive the effective per-slot settings.
    ///
    /// All configuration errors surface here, before any batch is sampled.
    pub fn resolve(&self) -> Result<SamplingPlan, SamplingError> {
        let strategy = SamplerRegistry::default().resolve(&self.name)?;

        if !self.with_replacement && !self.shared {
            return Err(SamplingError::Configuration(
                "without replacement sampling requires shared negative sampling".to_string(),
            ));
        }

        let implementation: FilterImplementation = self.filtering.implementation.parse()?;
        let filter = self.filter.to_array();
        let any_filter = filter.iter().any(|enabled| *enabled);
        if any_filter {
            if self.shared {
                return Err(SamplingError::Configuration(
                    "filtering is not supported when shared negative sampling is enabled"
                        .to_string(),
                ));
            }
            if strategy == StrategyKind::FullEnumeration {
                return Err(SamplingError::Configuration(format!(
                    "filtering is not supported by strategy '{}'",
                    strategy.name()
                )));
            }
            if self.filter.t {
                return Err(SamplingError::Configuration(
                    "filtering is not supported for the timestamp slot".to_string(),
                ));
            }
            if self.filtering.max_attempts == 0 {
                return Err(SamplingError::Configuration(
                    "filtering.max_attempts must be at least 1".to_string(),
                ));
            }
        }
        let filter_split =
            SplitLabel::resolve_filtering(&self.filtering.split, &self.train_split)?;

        let num_samples = derive_num_samples(self.num_samples.to_array());
        let generator = strategy.build();
        if self.as_matrix && !generator.supports_matrix() {
            return Err(SamplingError::Configuration(format!(
                "strategy '{}' requires as_matrix = false",
                strategy.name()
            )));
        }
        if !self.as_matrix && !generator.supports_flat() {
            return Err(SamplingError::Configuration(format!(
                "strategy '{}' requires as_matrix = true",
                strategy.name()
            )));
        }
        for slot in Slot::ALL {
            let sampled = num_samples[slot.index()] > 0 || filter[slot.index()];
            if sampled && !generator.corrupts(slot) {
                return Err(SamplingError::Configuration(format!(
                    "strategy '{}' cannot corrupt slot '{slot}'; set num_samples.{slot} to 0 and disable filter.{slot}",
                    strategy.name()
                )));
            }
        }

        Ok(SamplingPlan {
            strategy,
            num_samples,
            filter,
            filter_split,
            implementation,
            max_attempts: self.filtering.max_attempts,
            as_matrix: self.as_matrix,
            shared: self.shared,
            with_replacement: self.with_replacement,
            seed: self.seed,
        })
    }
}

fn derive_num_samples(mut counts: [i64; 4]) -> [usize; 4] {
    for (slot, paired) in NUM_SAMPLES_PAIRS {
        let idx = slot.index();
        if counts[idx] < 0 {
            counts[idx] = match paired {
                Some(other) if counts[other.index()] > 0 => counts[other.index()],
                _ => 0,
            };
        }
    }
    counts.map(|count| count.max(0) as usize)
}

/// Validated, typed sampling settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplingPlan {
    pub strategy: StrategyKind,
    /// Effective K per slot, indexed by [`Slot::index`].
    pub num_samples: [usize; 4],
    /// Filtering switch per slot, indexed by [`Slot::index`].
    pub filter: [bool; 4],
    pub filter_split: SplitLabel,
    pub implementation: FilterImplementation,
    pub max_attempts: usize,
    pub as_matrix: bool,
    pub shared: bool,
    pub with_replacement: bool,
    pub seed: u64,
}

impl SamplingPlan {
    pub fn num_samples(&self, slot: Slot) -> usize {
        self.num_samples[slot.index()]
    }

    pub fn filters(&self, slot: Slot) -> bool {
        self.filter[slot.index()]
    }

    pub fn any_filter(&self) -> bool {
        self.filter.iter().any(|enabled| *enabled)
    }
}
