#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Batch assembly: generation, filtering, and output shaping.
pub mod assembler;
/// Negative sampling configuration and its validated plan.
pub mod config;
/// Centralized constants used across sampling, filtering, and configuration.
pub mod constants;
/// Fact, slot, and output batch types.
pub mod data;
/// Dataset contracts and an in-memory fact store.
pub mod dataset;
/// Reusable example runners shared by downstream crates.
pub mod example_apps;
/// Filtering of candidates against known positives.
pub mod filter;
/// Candidate generation strategies.
pub mod generator;
mod hash;
/// Positive lookup indexes.
pub mod index;
/// Strategy name registry.
pub mod registry;
/// Deterministic random number generation.
pub mod rng;
/// Dataset split labels.
pub mod splits;
/// Shared type aliases.
pub mod types;

mod errors;

pub use assembler::{BatchAssembler, SampleOutput, StackedOutput};
pub use config::{FilteringConfig, NegativeSamplingConfig, SamplingPlan, SlotValues};
pub use data::{
    CandidateBatch, Fact, LabelBatch, LabelKind, Layout, PairKind, Query, Slot, SourceOrder,
};
pub use dataset::{FactDataset, IndexProvider, Vocabulary, VocabularyBuilder, VocabularySizes};
pub use errors::SamplingError;
pub use filter::{FilterImplementation, FilterReport, FilterResampler};
pub use generator::{
    FullEnumeration, ModuloOffset, RawCandidates, SampleGenerator, SharedAcrossBatch,
    TimeResample, Uniform, enumerate_queries,
};
pub use index::{IndexCache, PositiveIndex};
pub use registry::{SamplerRegistry, StrategyKind};
pub use rng::DeterministicRng;
pub use splits::SplitLabel;
pub use types::{ContextPair, Id, LabelValue, StrategyName, VocabLabel};
