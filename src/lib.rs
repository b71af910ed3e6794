//! # finetrack: Dataset Splitting and Training-Run Tracking
//!
//! Two independent tools for a LoRA fine-tuning workflow:
//!
//! - [`split`]: seeded two-stage train / validation / test split of a
//!   JSON-lines corpus.
//! - [`bridge`]: supervises an external trainer, turns its console output
//!   into metric samples and forwards them to a [`tracking::TrackingSink`].
//!
//! ## Example Usage
//!
//! ```rust
//! use finetrack::bridge::{ExitStatus, RunBridge, RunStatus, TrainingConfig};
//! use finetrack::tracking::MemorySink;
//!
//! let mut bridge = RunBridge::new(MemorySink::new());
//! let mut handle = bridge.start_run(&TrainingConfig::default())?;
//!
//! // Feed trainer output through the parser without spawning a process
//! bridge.observe_line(&mut handle, "Iter 10: Train loss 1.234, It/sec 0.9");
//!
//! let report = bridge.finish_run(handle, ExitStatus::from_code(1))?;
//! assert_eq!(report.status, RunStatus::Failed);
//! assert_eq!(bridge.sink().metric_count(), 1);
//! # Ok::<(), finetrack::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod split;
pub mod tracking;

pub use error::{Error, Result};
