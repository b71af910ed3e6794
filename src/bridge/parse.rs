//! Trainer output parsing
//!
//! The trainer prints free-form progress lines. Two patterns carry
//! metrics:
//!
//! ```text
//! Iter 10: Train loss 2.345, It/sec 0.512, Tokens/sec 210.3
//! Iter 20: Val loss 2.101, Val took 4.2s
//! ```
//!
//! The step is sticky: a line without an `Iter <n>:` marker reports its
//! losses at the last step seen.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Metric name for training loss.
pub const TRAIN_LOSS: &str = "train_loss";

/// Metric name for validation loss.
pub const VAL_LOSS: &str = "val_loss";

static ITER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Iter\s*(\d+):").expect("static pattern"));
static VAL_LOSS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Val loss\s*([\d.]+)").expect("static pattern"));
static TRAIN_LOSS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Train loss\s*([\d.]+)").expect("static pattern"));

/// One (name, value, step) triple extracted from trainer output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    /// Metric name, [`TRAIN_LOSS`] or [`VAL_LOSS`]
    pub name: &'static str,
    /// Parsed value
    pub value: f64,
    /// Iteration the value belongs to
    pub step: u64,
}

impl MetricSample {
    /// Create a sample.
    #[must_use]
    pub const fn new(name: &'static str, value: f64, step: u64) -> Self {
        Self { name, value, step }
    }
}

/// Parse one line of trainer output.
///
/// Returns the step to carry into the next line and the samples found on
/// this one (zero, one or two). Validation loss is reported before
/// training loss when both appear. A label followed by text that is not a
/// valid number yields no sample; an iteration number that does not fit in
/// `u64` leaves the step unchanged.
///
/// ```rust
/// use finetrack::bridge::{parse_line, MetricSample};
///
/// let (step, samples) = parse_line("Iter 5: Train loss 0.432", 0);
/// assert_eq!(step, 5);
/// assert_eq!(samples, vec![MetricSample::new("train_loss", 0.432, 5)]);
/// ```
#[must_use]
pub fn parse_line(line: &str, current_step: u64) -> (u64, Vec<MetricSample>) {
    let step = ITER_PATTERN
        .captures(line)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .unwrap_or(current_step);

    let samples = [(VAL_LOSS, &*VAL_LOSS_PATTERN), (TRAIN_LOSS, &*TRAIN_LOSS_PATTERN)]
        .into_iter()
        .filter_map(|(name, pattern)| {
            let caps = pattern.captures(line)?;
            let value = caps[1].parse::<f64>().ok()?;
            Some(MetricSample::new(name, value, step))
        })
        .collect();

    (step, samples)
}
