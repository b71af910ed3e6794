//! Property-based tests for finetrack
//!
//! - Split invariants: determinism, exact partition, symmetric holdouts
//! - Parser invariants: purity, sticky step, best-effort numbers
//! - Run with ProptestConfig::with_cases(100)

use std::collections::HashSet;

use finetrack::bridge::{parse_line, MetricSample, TRAIN_LOSS, VAL_LOSS};
use finetrack::split::{holdout_size, split_dataset, SplitOptions};
use proptest::prelude::*;
use quickcheck::quickcheck;

// ============================================================================
// Strategies
// ============================================================================

/// Distinct record ids, so partition checks can use set membership
fn arb_records(max: usize) -> impl Strategy<Value = Vec<u32>> {
    (0..=max).prop_map(|n| (0..u32::try_from(n).unwrap()).collect::<Vec<u32>>())
}

fn arb_options() -> impl Strategy<Value = SplitOptions> {
    (any::<u64>(), 1u32..=50).prop_map(|(seed, percent)| SplitOptions {
        seed,
        test_fraction: f64::from(percent) / 100.0,
    })
}

/// Arbitrary printable trainer chatter, possibly containing the labels
fn arb_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{0,60}",
        (0u64..100_000, 0.0f64..10.0)
            .prop_map(|(iter, loss)| format!("Iter {iter}: Train loss {loss:.3}, It/sec 1.0")),
        (0.0f64..10.0).prop_map(|loss| format!("Val loss {loss:.4}")),
        "(Train|Val) loss [a-z.]{1,6}",
    ]
}

// ============================================================================
// Split Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: same seed and input give the same partition
    #[test]
    fn prop_split_deterministic(records in arb_records(300), options in arb_options()) {
        let a = split_dataset(records.clone(), &options).unwrap();
        let b = split_dataset(records, &options).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Property: partitions are disjoint and cover the input
    #[test]
    fn prop_split_is_partition(records in arb_records(300), options in arb_options()) {
        let n = records.len();
        let split = split_dataset(records, &options).unwrap();

        prop_assert_eq!(split.train.len() + split.validation.len() + split.test.len(), n);

        let mut seen = HashSet::new();
        for id in split.train.iter().chain(&split.validation).chain(&split.test) {
            prop_assert!(seen.insert(*id), "record {} duplicated", id);
        }
        prop_assert_eq!(seen.len(), n);
    }

    /// Property: validation and test always have the same size
    #[test]
    fn prop_validation_matches_test(records in arb_records(300), options in arb_options()) {
        let n = records.len();
        let split = split_dataset(records, &options).unwrap();

        prop_assert_eq!(split.validation.len(), split.test.len());
        prop_assert_eq!(split.test.len(), holdout_size(n, options.test_fraction));
    }

    /// Property: with the default fraction and N >= 10 every split is non-empty
    #[test]
    fn prop_default_split_non_empty(n in 10usize..1000, seed in any::<u64>()) {
        let options = SplitOptions { seed, ..SplitOptions::default() };
        let split = split_dataset((0..n).collect::<Vec<_>>(), &options).unwrap();

        prop_assert!(!split.train.is_empty());
        prop_assert!(!split.validation.is_empty());
        prop_assert!(!split.test.is_empty());
    }

    // ========================================================================
    // Parser Properties
    // ========================================================================

    /// Property: parse_line is pure
    #[test]
    fn prop_parse_line_pure(line in arb_line(), step in any::<u64>()) {
        prop_assert_eq!(parse_line(&line, step), parse_line(&line, step));
    }

    /// Property: without an iteration marker the step is carried forward
    #[test]
    fn prop_step_sticky_without_marker(line in "[ -~]{0,60}", step in any::<u64>()) {
        prop_assume!(!line.contains("Iter"));
        let (next, samples) = parse_line(&line, step);
        prop_assert_eq!(next, step);
        prop_assert!(samples.iter().all(|s| s.step == step));
    }

    /// Property: every sample is stamped with the returned step
    #[test]
    fn prop_samples_use_updated_step(line in arb_line(), step in any::<u64>()) {
        let (next, samples) = parse_line(&line, step);
        prop_assert!(samples.len() <= 2);
        prop_assert!(samples.iter().all(|s| s.step == next));
        prop_assert!(samples.iter().all(|s| s.name == TRAIN_LOSS || s.name == VAL_LOSS));
    }

    /// Property: formatted losses are recovered
    #[test]
    fn prop_train_loss_recovered(iter in 0u64..1_000_000, loss in 0.0f64..100.0) {
        let text = format!("{loss:.4}");
        let line = format!("Iter {iter}: Train loss {text}, Learning Rate 1.000e-05");
        let (step, samples) = parse_line(&line, 0);

        prop_assert_eq!(step, iter);
        prop_assert_eq!(
            samples,
            vec![MetricSample::new(TRAIN_LOSS, text.parse::<f64>().unwrap(), iter)]
        );
    }

    /// Property: letters after a label never produce a sample
    #[test]
    fn prop_non_numeric_label_dropped(word in "[a-z]{1,8}", step in any::<u64>()) {
        let line = format!("Train loss {word}");
        prop_assert!(parse_line(&line, step).1.is_empty());
    }
}

// ============================================================================
// QuickCheck: parser purity on arbitrary (not just printable) input
// ============================================================================

quickcheck! {
    fn qc_parse_line_pure(line: String, step: u64) -> bool {
        parse_line(&line, step) == parse_line(&line, step)
    }

    fn qc_step_only_moves_on_marker(line: String, step: u64) -> bool {
        line.contains("Iter") || parse_line(&line, step).0 == step
    }
}
