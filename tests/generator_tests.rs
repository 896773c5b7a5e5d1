mod common;

use common::{load_descriptor, TestContext, TAXA};

use ppcheck::alignment::AlignmentSource;
use ppcheck::error::AdequacyError;
use ppcheck::posterior::{TraceTable, TreeLog};
use ppcheck::replicates::generate_replicates;
use ppcheck::setup;

fn load_sample(ctx: &TestContext, burn_in: u8) -> (TraceTable, TreeLog) {
    let trace = TraceTable::from_path(ctx.log_dir().join("primates.log"), burn_in).unwrap();
    let trees = TreeLog::from_path(ctx.log_dir().join("primates.trees"), burn_in).unwrap();
    (trace, trees)
}

#[test]
fn too_many_replicates_fail_before_any_simulation() {
    let ctx = TestContext::new(100, 100);
    let mut analysis = load_descriptor(&ctx).build().unwrap();
    let (trace, mut trees) = load_sample(&ctx, 0);

    let err = generate_replicates(&mut analysis, &trace, &mut trees, 150, Some(1)).unwrap_err();
    match err {
        AdequacyError::InsufficientSamples {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 150);
            assert_eq!(available, 100);
        }
        other => panic!("unexpected error: {}", other),
    }
    // Nothing was consumed from the tree stream.
    assert_eq!(trees.remaining(), 100);
}

#[test]
fn burn_in_shrinks_the_available_sample() {
    let ctx = TestContext::new(100, 100);
    let mut analysis = load_descriptor(&ctx).build().unwrap();
    let (trace, mut trees) = load_sample(&ctx, 10);
    assert_eq!(trace.n_rows(), 90);

    assert!(generate_replicates(&mut analysis, &trace, &mut trees, 95, Some(1)).is_err());
    assert!(generate_replicates(&mut analysis, &trace, &mut trees, 90, Some(1)).is_ok());
}

#[test]
fn end_to_end_ten_replicates() {
    let ctx = TestContext::new(100, 100);
    let descriptor = load_descriptor(&ctx);
    let mut analysis = descriptor.build().unwrap();
    let (trace, mut trees) = load_sample(&ctx, 0);

    let replicates = generate_replicates(&mut analysis, &trace, &mut trees, 10, Some(42)).unwrap();
    assert_eq!(replicates.len(), 10);

    let site_count = analysis.observed.site_count();
    for alignment in &replicates {
        assert_eq!(alignment.site_count(), site_count);
        let mut names = alignment.taxon_names().to_vec();
        names.sort();
        let mut expected: Vec<String> = TAXA.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    // Installing the catalog bounds the indicator to [0, 9].
    let run = setup::configure_run(analysis, replicates).unwrap();
    let indicator = run.chain.graph.int(run.indicator).unwrap();
    assert_eq!(indicator.lower, 0);
    assert_eq!(indicator.upper, 9);
    assert_eq!(indicator.value, 0);
}

#[test]
fn replicate_generation_is_deterministic_under_a_seed() {
    let ctx = TestContext::new(50, 50);
    let mut analysis = load_descriptor(&ctx).build().unwrap();

    let (trace, mut trees) = load_sample(&ctx, 0);
    let first = generate_replicates(&mut analysis, &trace, &mut trees, 5, Some(7)).unwrap();
    let (trace, mut trees) = load_sample(&ctx, 0);
    let second = generate_replicates(&mut analysis, &trace, &mut trees, 5, Some(7)).unwrap();

    for (a, b) in first.iter().zip(&second) {
        for taxon in TAXA {
            assert_eq!(a.sequence_string(taxon), b.sequence_string(taxon));
        }
    }
}

#[test]
fn replicates_vary_across_indices() {
    let ctx = TestContext::new(50, 50);
    let mut analysis = load_descriptor(&ctx).build().unwrap();
    let (trace, mut trees) = load_sample(&ctx, 0);

    let replicates = generate_replicates(&mut analysis, &trace, &mut trees, 5, Some(7)).unwrap();
    let rendered: Vec<String> = replicates.iter().map(|a| a.render()).collect();
    // With 12 sites and different draws, at least one pair must differ.
    assert!(
        rendered.iter().any(|r| r != &rendered[0]),
        "all replicates identical"
    );
}

#[test]
fn rewired_descriptor_declares_the_indicator() {
    let ctx = TestContext::new(20, 20);
    let descriptor = load_descriptor(&ctx);
    let path = ctx.log_dir().join("primates.adequacy.json");
    setup::write_rewired_descriptor(&descriptor, 10, &path).unwrap();

    let rewired = ppcheck::descriptor::AnalysisDescriptor::load_from_file(&path).unwrap();
    let indicator = rewired
        .parameters
        .iter()
        .find(|p| p.id == setup::INDICATOR_ID)
        .expect("indicator parameter missing");
    assert_eq!(indicator.kind, "int");
    assert_eq!(indicator.upper, Some(9.0));
}
