use std::sync::Arc;

use tkge_negatives::filter::{FilterContext, count_collisions};
use tkge_negatives::{
    BatchAssembler, DeterministicRng, Fact, FactDataset, FilterImplementation, FilterResampler,
    IndexProvider, ModuloOffset, NegativeSamplingConfig, PositiveIndex, SampleGenerator,
    SamplingError, Slot, SplitLabel, Uniform, VocabularySizes,
};

fn dense_dataset() -> (Arc<FactDataset>, Vec<Fact>) {
    // Every subject/predicate pair knows objects 0..6 plus its own subject id.
    let mut facts = Vec::new();
    for subject in 0..8 {
        for predicate in 0..2 {
            for object in 0..6 {
                facts.push(Fact::quad(subject, predicate, object, 0));
            }
            facts.push(Fact::quad(subject, predicate, subject, 1));
        }
    }
    let dataset = FactDataset::new(VocabularySizes {
        entities: 12,
        relations: 2,
        timestamps: 2,
    })
    .with_split(SplitLabel::Train, facts.clone())
    .expect("dataset");
    (Arc::new(dataset), facts)
}

fn config(raw: &str) -> NegativeSamplingConfig {
    NegativeSamplingConfig::from_json_str(raw).expect("config")
}

#[test]
fn fast_and_standard_paths_agree() {
    let (dataset, facts) = dense_dataset();
    let index = dataset.index(SplitLabel::Train, Slot::Object).expect("index");
    let mut rng = DeterministicRng::new(21);
    let raw = Uniform
        .generate(&facts, Slot::Object, 12, 16, &mut rng)
        .expect("raw");
    assert!(count_collisions(&raw, &facts, &index) > 0);

    let ctx = FilterContext {
        generator: &Uniform,
        facts: &facts,
        slot: Slot::Object,
        vocab: 12,
        index: &index,
        step_seed: 1234,
    };
    let resampler = FilterResampler::new(FilterImplementation::Standard, 1000);
    let mut standard = raw.clone();
    let mut fast = raw.clone();
    let standard_report = resampler
        .filter_standard(&mut standard, &ctx)
        .expect("standard");
    let fast_report = resampler.filter_fast(&mut fast, &ctx).expect("fast");
    assert_eq!(standard.ids, fast.ids);
    assert_eq!(standard_report.resampled, fast_report.resampled);
    assert_eq!(count_collisions(&standard, &facts, &index), 0);
}

#[test]
fn assembler_outputs_match_across_implementations() {
    let (dataset, facts) = dense_dataset();
    let run = |implementation: &str| {
        let cfg = config(&format!(
            r#"{{ "num_samples": {{ "s": 5, "o": 9 }}, "filter": {{ "s": true, "o": true }},
                 "filtering": {{ "implementation": "{implementation}" }}, "seed": 3 }}"#
        ));
        let mut assembler =
            BatchAssembler::new(&cfg, Arc::clone(&dataset)).expect("assembler");
        assembler.sample_configured(&facts).expect("outputs")
    };
    let standard = run("standard");
    let fast = run("fast");
    let auto = run("fast_if_available");
    assert_eq!(standard.len(), 2);
    for ((a, b), c) in standard.iter().zip(&fast).zip(&auto) {
        assert_eq!(a.1.candidates, b.1.candidates);
        assert_eq!(a.1.candidates, c.1.candidates);
        assert_eq!(
            c.1.filter.expect("report").implementation,
            FilterImplementation::Fast
        );
    }
}

#[test]
fn filtered_rows_exclude_positives() {
    let (dataset, facts) = dense_dataset();
    let cfg = config(r#"{ "num_samples": { "o": 20 }, "filter": { "o": true } }"#);
    let mut assembler = BatchAssembler::new(&cfg, Arc::clone(&dataset)).expect("assembler");
    let index = dataset.index(SplitLabel::Train, Slot::Object).expect("index");
    for _ in 0..4 {
        let output = assembler.sample(&facts, Slot::Object).expect("output");
        for (row, fact) in facts.iter().enumerate() {
            let pair = index.context_of(fact);
            let ids = output.candidates.row(row).expect("row");
            assert!(ids.iter().all(|id| !index.contains(pair, *id)));
        }
    }
}

#[test]
fn fallback_is_reported_and_pinned() {
    let (dataset, facts) = dense_dataset();
    let cfg = config(
        r#"{ "name": "time_agnostic", "num_samples": { "o": 4 }, "filter": { "o": true } }"#,
    );
    let mut assembler = BatchAssembler::new(&cfg, Arc::clone(&dataset)).expect("assembler");
    assert_eq!(
        assembler.filter_implementation(),
        FilterImplementation::FastIfAvailable
    );
    let output = assembler.sample(&facts, Slot::Object).expect("output");
    assert_eq!(
        output.filter.expect("report").implementation,
        FilterImplementation::Standard
    );
    assert_eq!(assembler.filter_implementation(), FilterImplementation::Standard);
    for (row, fact) in facts.iter().enumerate() {
        assert_eq!(output.candidates.row(row).expect("row")[0], fact.object);
    }
}

#[test]
fn explicit_fast_without_support_is_unsupported() {
    let (dataset, facts) = dense_dataset();
    let cfg = config(
        r#"{ "name": "time_agnostic", "num_samples": { "o": 4 }, "filter": { "o": true },
             "filtering": { "implementation": "fast" } }"#,
    );
    let mut assembler = BatchAssembler::new(&cfg, dataset).expect("assembler");
    let err = assembler
        .sample(&facts, Slot::Object)
        .expect_err("fast is not available for modulo offsets");
    assert!(err.is_unsupported());
}

#[test]
fn second_filter_pass_changes_nothing() {
    let (dataset, facts) = dense_dataset();
    let index = dataset.index(SplitLabel::Train, Slot::Object).expect("index");
    let mut rng = DeterministicRng::new(8);
    let mut raw = ModuloOffset
        .generate(&facts, Slot::Object, 12, 10, &mut rng)
        .expect("raw");
    let ctx = FilterContext {
        generator: &ModuloOffset,
        facts: &facts,
        slot: Slot::Object,
        vocab: 12,
        index: &index,
        step_seed: 77,
    };
    let resampler = FilterResampler::new(FilterImplementation::FastIfAvailable, 1000);
    resampler.filter(&mut raw, &ctx).expect("first pass");
    let once = raw.clone();
    let report = resampler.filter(&mut raw, &ctx).expect("second pass");
    assert_eq!(report.resampled, 0);
    assert_eq!(raw, once);
}

#[test]
fn exhausted_vocabulary_surfaces_as_error() {
    // Subject 0 under predicate 0 already knows every entity.
    let facts: Vec<Fact> = (0..4).map(|object| Fact::triple(0, 0, object)).collect();
    let dataset = Arc::new(
        FactDataset::new(VocabularySizes {
            entities: 4,
            relations: 1,
            timestamps: 1,
        })
        .with_split(SplitLabel::Train, facts.clone())
        .expect("dataset"),
    );
    let cfg = config(r#"{ "num_samples": { "o": 8 }, "filter": { "o": true } }"#);
    let mut assembler = BatchAssembler::new(&cfg, dataset).expect("assembler");
    match assembler.sample(&facts[..1], Slot::Object) {
        Err(SamplingError::Exhausted { slot, row, .. }) => {
            assert_eq!(slot, Slot::Object);
            assert_eq!(row, 0);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn filtering_against_another_split() {
    let train = vec![Fact::triple(0, 0, 1)];
    let valid = vec![Fact::triple(0, 0, 2), Fact::triple(0, 0, 3)];
    let dataset = Arc::new(
        FactDataset::new(VocabularySizes {
            entities: 5,
            relations: 1,
            timestamps: 1,
        })
        .with_split(SplitLabel::Train, train.clone())
        .expect("train")
        .with_split(SplitLabel::Validation, valid)
        .expect("valid"),
    );
    let cfg = config(
        r#"{ "num_samples": { "o": 6 }, "filter": { "o": true },
             "filtering": { "split": "valid" } }"#,
    );
    let mut assembler = BatchAssembler::new(&cfg, Arc::clone(&dataset)).expect("assembler");
    assert!(
        dataset
            .index_cache()
            .cached(SplitLabel::Validation, Slot::Object)
            .is_some()
    );
    let output = assembler.sample(&train, Slot::Object).expect("output");
    let ids = output.candidates.row(0).expect("row");
    assert!(ids.iter().all(|id| *id != 2 && *id != 3));
}

#[test]
fn standalone_index_matches_dataset_index() {
    let (dataset, facts) = dense_dataset();
    let built = PositiveIndex::build(&facts, Slot::Subject).expect("index");
    let cached = dataset.index(SplitLabel::Train, Slot::Subject).expect("index");
    assert_eq!(built.len(), cached.len());
    assert_eq!(built.num_positives(), cached.num_positives());
}

#[test]
fn reserved_original_counts_against_vocabulary_when_not_a_positive() {
    // The reserved original 0 is absent from the valid split, so it is excluded on top
    // of the valid positives {1, 2}.
    let split_dataset = |entities: usize| {
        Arc::new(
            FactDataset::new(VocabularySizes {
                entities,
                relations: 1,
                timestamps: 1,
            })
            .with_split(SplitLabel::Train, vec![Fact::triple(0, 0, 0)])
            .expect("train")
            .with_split(
                SplitLabel::Validation,
                vec![Fact::triple(0, 0, 1), Fact::triple(0, 0, 2)],
            )
            .expect("valid"),
        )
    };
    let cfg = config(
        r#"{ "name": "time_agnostic", "num_samples": { "o": 3 }, "filter": { "o": true },
             "filtering": { "split": "valid" } }"#,
    );
    let train = [Fact::triple(0, 0, 0)];

    let mut tight = BatchAssembler::new(&cfg, split_dataset(3)).expect("assembler");
    match tight.sample(&train, Slot::Object) {
        Err(SamplingError::Exhausted { row, attempts, .. }) => {
            assert_eq!(row, 0);
            assert_eq!(attempts, 0);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    let mut roomy = BatchAssembler::new(&cfg, split_dataset(4)).expect("assembler");
    let output = roomy.sample(&train, Slot::Object).expect("output");
    assert_eq!(output.candidates.row(0).expect("row"), &[0, 3, 3, 3]);
}
