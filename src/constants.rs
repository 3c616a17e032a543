use crate::data::Slot;

/// Constants used by the sampler runtime and configuration defaults.
pub mod sampler {
    /// Default RNG seed when none is configured.
    pub const DEFAULT_SEED: u64 = 42;
    /// Offset mixed into per-step seed derivation for deterministic variation.
    pub const STEP_SEED_OFFSET: u64 = 0xB4C3_5EED;
    /// Default strategy name.
    pub const DEFAULT_STRATEGY: &str = "uniform";
    /// Default name of the training split.
    pub const DEFAULT_TRAIN_SPLIT: &str = "train";
    /// Prefix used on log lines emitted by this crate.
    pub const LOG_PREFIX: &str = "[tkge:sampling]";
}

/// Constants used by the filter/resample loop.
pub mod filtering {
    /// Default cap on resample rounds for a single row.
    pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;
    /// Configuration value selecting the per-row implementation.
    pub const IMPL_STANDARD: &str = "standard";
    /// Configuration value selecting the bulk implementation.
    pub const IMPL_FAST: &str = "fast";
    /// Configuration value selecting bulk with fallback to per-row.
    pub const IMPL_FAST_IF_AVAILABLE: &str = "fast_if_available";
}

/// Registered strategy names.
pub mod strategies {
    /// Independent uniform draws per row.
    pub const UNIFORM: &str = "uniform";
    /// Modulo-offset corruption with the positive in the first column.
    pub const TIME_AGNOSTIC: &str = "time_agnostic";
    /// Uniform timestamp corruption with positives in the leading rows.
    pub const ATISE_TIME: &str = "atise_time";
    /// Full vocabulary enumeration.
    pub const NO_SAMPLING: &str = "no_sampling";
}

/// Slots whose `num_samples` can be derived from a paired slot when configured negative.
pub const NUM_SAMPLES_PAIRS: [(Slot, Option<Slot>); 4] = [
    (Slot::Subject, Some(Slot::Object)),
    (Slot::Predicate, None),
    (Slot::Object, Some(Slot::Subject)),
    (Slot::Timestamp, None),
];
