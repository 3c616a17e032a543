use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, error::ErrorKind};
use rand::Rng;

use crate::assembler::{BatchAssembler, SampleOutput};
use crate::config::NegativeSamplingConfig;
use crate::data::{Fact, Layout, Slot};
use crate::dataset::{FactDataset, VocabularySizes};
use crate::registry::SamplerRegistry;
use crate::rng::DeterministicRng;
use crate::splits::SplitLabel;
use crate::SamplingError;

#[derive(Debug, Parser)]
#[command(
    name = "sampling_demo",
    disable_help_subcommand = true,
    about = "Sample negatives for a synthetic temporal knowledge graph",
    long_about = "Generate a synthetic fact set, build a batch assembler from a JSON config and/or flags, and print one batch of candidates and labels per configured slot.",
    after_help = "Flags override values loaded from --config. Slots are given as s, p, o, or t."
)]
/// CLI for `sampling_demo`.
///
/// Common usage:
/// - Default uniform sampling: `cargo run --example sampling_demo`
/// - Filter object corruptions: `--filter-slot o --filter-impl standard`
/// - Load a config file: `--config negative_sampling.json`
struct SamplingDemoCli {
    #[arg(long, value_name = "PATH", help = "Optional JSON negative sampling config")]
    config: Option<PathBuf>,
    #[arg(long, help = "Strategy name override")]
    strategy: Option<String>,
    #[arg(
        long = "list-strategies",
        help = "Print registered strategy names and exit"
    )]
    list_strategies: bool,
    #[arg(
        long = "batch-size",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Number of positive facts per batch"
    )]
    batch_size: usize,
    #[arg(
        long = "num-samples",
        value_parser = parse_positive_usize,
        help = "Override K for the subject and object slots"
    )]
    num_samples: Option<usize>,
    #[arg(
        long = "filter-slot",
        value_name = "SLOT",
        value_parser = parse_slot_arg,
        help = "Enable filtering for a slot, repeat as needed"
    )]
    filter_slots: Vec<Slot>,
    #[arg(
        long = "filter-impl",
        value_name = "IMPL",
        help = "standard, fast, or fast_if_available"
    )]
    filter_impl: Option<String>,
    #[arg(long, help = "Emit flattened sequences instead of matrices")]
    flat: bool,
    #[arg(long, help = "Share one candidate vector across the batch")]
    shared: bool,
    #[arg(long, help = "Optional deterministic seed override")]
    seed: Option<u64>,
    #[arg(long, default_value_t = 50, help = "Synthetic entity count")]
    entities: usize,
    #[arg(long, default_value_t = 5, help = "Synthetic relation count")]
    relations: usize,
    #[arg(long, default_value_t = 12, help = "Synthetic timestamp count")]
    timestamps: usize,
    #[arg(
        long = "train-facts",
        default_value_t = 400,
        help = "Number of synthetic training facts"
    )]
    train_facts: usize,
}

/// Run the sampling demo with `args_iter` (program name excluded).
pub fn run_sampling_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<SamplingDemoCli, _>(
        std::iter::once("sampling_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    if cli.list_strategies {
        for name in SamplerRegistry::default().names() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = demo_config(&cli)?;
    let sizes = VocabularySizes {
        entities: cli.entities,
        relations: cli.relations,
        timestamps: cli.timestamps,
    };
    let train = synthetic_facts(sizes, cli.train_facts, config.seed);
    let dataset = Arc::new(FactDataset::new(sizes).with_split(SplitLabel::Train, train)?);
    let batch: Vec<Fact> = dataset
        .facts(SplitLabel::Train)
        .iter()
        .take(cli.batch_size)
        .copied()
        .collect();

    let mut assembler = BatchAssembler::new(&config, Arc::clone(&dataset))?;
    println!(
        "Strategy '{}' over {} entities, {} relations, {} timestamps ({} training facts)",
        assembler.strategy_name(),
        sizes.entities,
        sizes.relations,
        sizes.timestamps,
        dataset.facts(SplitLabel::Train).len()
    );
    match assembler.sample_configured(&batch) {
        Ok(outputs) => {
            if outputs.is_empty() {
                println!("No slot has a positive sample count; nothing to sample.");
            }
            for (slot, output) in &outputs {
                print_output(*slot, output, &batch)?;
            }
        }
        Err(SamplingError::Exhausted {
            slot,
            row,
            attempts,
            details,
        }) => {
            eprintln!(
                "Filtering exhausted slot '{slot}' at row {row} after {attempts} attempts: {details}. Try a larger vocabulary or fewer facts."
            );
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn demo_config(cli: &SamplingDemoCli) -> Result<NegativeSamplingConfig, SamplingError> {
    let mut config = match &cli.config {
        Some(path) => NegativeSamplingConfig::from_path(path)?,
        None => NegativeSamplingConfig::default(),
    };
    if let Some(name) = &cli.strategy {
        config.name = name.clone();
    }
    if let Some(k) = cli.num_samples {
        config.num_samples.s = k as i64;
        config.num_samples.o = k as i64;
    }
    for slot in &cli.filter_slots {
        match slot {
            Slot::Subject => config.filter.s = true,
            Slot::Predicate => config.filter.p = true,
            Slot::Object => config.filter.o = true,
            Slot::Timestamp => config.filter.t = true,
        }
    }
    if let Some(implementation) = &cli.filter_impl {
        config.filtering.implementation = implementation.clone();
    }
    if cli.flat {
        config.as_matrix = false;
    }
    if cli.shared {
        config.shared = true;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn synthetic_facts(sizes: VocabularySizes, count: usize, seed: u64) -> Vec<Fact> {
    if sizes.entities == 0 || sizes.relations == 0 || sizes.timestamps == 0 {
        return Vec::new();
    }
    let mut rng = DeterministicRng::new(seed);
    (0..count)
        .map(|_| {
            Fact::quad(
                rng.random_range(0..sizes.entities),
                rng.random_range(0..sizes.relations),
                rng.random_range(0..sizes.entities),
                rng.random_range(0..sizes.timestamps),
            )
        })
        .collect()
}

fn print_output(slot: Slot, output: &SampleOutput, batch: &[Fact]) -> Result<(), SamplingError> {
    println!();
    println!(
        "=== slot '{}' | {:?} | labels {:?} ({} positive) ===",
        slot,
        output.candidates.layout,
        output.labels.kind,
        output.labels.positives()
    );
    if let Some(report) = output.filter {
        println!(
            "filtered via {}: {} resampled, at most {} rounds per row",
            report.implementation, report.resampled, report.max_rounds
        );
    }
    match output.candidates.layout {
        Layout::Matrix { rows, cols } => {
            for row in 0..rows {
                let ids = &output.candidates.ids[row * cols..(row + 1) * cols];
                let labels = &output.labels.values[row * cols..(row + 1) * cols];
                println!("  {:?} -> {:?} {:?}", batch[row], ids, labels);
            }
        }
        Layout::Flat { .. } => {
            println!("  ids:    {:?}", output.candidates.ids);
            println!("  labels: {:?}", output.labels.values);
        }
    }
    let corrupted = output.candidates.corrupted_facts(batch)?;
    println!("  first corrupted facts:");
    for fact in corrupted.iter().take(3) {
        println!("    {fact:?}");
    }
    Ok(())
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid value '{raw}': expected a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_slot_arg(raw: &str) -> Result<Slot, String> {
    raw.parse::<Slot>().map_err(|err| err.to_string())
}
