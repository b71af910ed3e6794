//! Dataset Splitter
//!
//! Seeded two-stage random split into train / validation / test:
//!
//! 1. Shuffle all records and take the test slice (`ceil(N * fraction)`).
//! 2. Reshuffle the remainder with a fresh RNG from the same seed and take
//!    a validation slice of the same size as the test slice.
//! 3. Whatever is left is the training set.
//!
//! Records are moved, never inspected, so the three outputs partition the
//! input exactly.

mod jsonl;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub use jsonl::{
    parse_jsonl, read_jsonl, write_jsonl, write_splits, SplitSummary, TEST_FILE, TRAIN_FILE,
    VALID_FILE,
};

use crate::{Error, Result};

/// One training example: an opaque JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 42;

/// Default share of records held out for testing.
pub const DEFAULT_TEST_FRACTION: f64 = 0.1;

/// Smallest dataset for which every partition is expected to be non-empty.
pub const MIN_RECOMMENDED_RECORDS: usize = 10;

/// Split parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitOptions {
    /// Share of records in the test set; validation gets the same count
    pub test_fraction: f64,
    /// RNG seed; equal seeds give equal partitions
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitOptions {
    /// Check the test fraction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `0 < test_fraction <= 0.5`.
    pub fn validate(&self) -> Result<()> {
        if self.test_fraction > 0.0 && self.test_fraction <= 0.5 {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "test_fraction must be in (0, 0.5], got {}",
                self.test_fraction
            )))
        }
    }
}

/// The three partitions of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit<T = Record> {
    /// Training records
    pub train: Vec<T>,
    /// Validation records, as many as `test`
    pub validation: Vec<T>,
    /// Held-out test records
    pub test: Vec<T>,
}

impl<T> DatasetSplit<T> {
    /// Total number of records across all partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    /// Whether all partitions are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Size of the test (and validation) slice for `n` records.
///
/// `ceil(n * fraction)`, ignoring floating-point noise just above an
/// integer, and capped at `n / 2` so both slices always fit.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn holdout_size(n: usize, fraction: f64) -> usize {
    let raw = (n as f64 * fraction - 1e-9).ceil().max(0.0) as usize;
    raw.min(n / 2)
}

/// Split `records` into train / validation / test.
///
/// ```rust
/// use finetrack::split::{split_dataset, SplitOptions};
///
/// let split = split_dataset((0..100).collect::<Vec<_>>(), &SplitOptions::default())?;
/// assert_eq!(split.test.len(), 10);
/// assert_eq!(split.validation.len(), 10);
/// assert_eq!(split.train.len(), 80);
/// # Ok::<(), finetrack::Error>(())
/// ```
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the options are invalid.
pub fn split_dataset<T>(records: Vec<T>, options: &SplitOptions) -> Result<DatasetSplit<T>> {
    options.validate()?;
    let holdout = holdout_size(records.len(), options.test_fraction);

    let mut pool = records;
    pool.shuffle(&mut StdRng::seed_from_u64(options.seed));
    let mut remainder = pool.split_off(holdout);
    let test = pool;

    remainder.shuffle(&mut StdRng::seed_from_u64(options.seed));
    let train = remainder.split_off(holdout);
    let validation = remainder;

    Ok(DatasetSplit {
        train,
        validation,
        test,
    })
}
