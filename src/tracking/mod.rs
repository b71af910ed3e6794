//! Experiment Tracking Sink
//!
//! The run bridge reports everything it learns through the
//! [`TrackingSink`] trait. Two implementations ship with the crate:
//!
//! - [`MemorySink`]: in-process store, used offline and in tests.
//! - [`MlflowSink`]: MLflow tracking server over its REST API.
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (1) ──┬──< ParamRecord (N)
//!                 ├──< MetricRecord (N) [time-series, keyed by step]
//!                 └──< ArtifactRecord (N)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use finetrack::tracking::{MemorySink, RunStatus, TrackingSink};
//!
//! let mut sink = MemorySink::new();
//! let run = sink.create_run(Some("smoke"))?;
//! sink.set_status(run.run_id(), RunStatus::Running)?;
//! sink.log_metric(run.run_id(), "train_loss", 1.5, 10)?;
//! sink.set_status(run.run_id(), RunStatus::Failed)?;
//!
//! assert_eq!(sink.get_run(run.run_id()).unwrap().status(), RunStatus::Failed);
//! # Ok::<(), finetrack::Error>(())
//! ```

mod artifact_record;
mod memory;
mod metric_record;
mod mlflow;
mod run_record;

use std::path::Path;

pub use artifact_record::ArtifactRecord;
pub use memory::MemorySink;
pub use metric_record::{MetricRecord, ParamRecord};
pub use mlflow::MlflowSink;
pub use run_record::{RunRecord, RunStatus};

use crate::Result;

/// Destination for run parameters, metrics, artifacts and status.
///
/// Calls are synchronous and made sequentially from a single thread.
pub trait TrackingSink {
    /// Open a new run. The returned record is in `Created` status.
    fn create_run(&mut self, run_name: Option<&str>) -> Result<RunRecord>;

    /// Record a parameter verbatim.
    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Record one metric data point.
    fn log_metric(&mut self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()>;

    /// Persist a local file under `artifact_path` in the run's artifacts.
    fn log_artifact(&mut self, run_id: &str, local_path: &Path, artifact_path: &str)
        -> Result<()>;

    /// Record a run status change.
    fn set_status(&mut self, run_id: &str, status: RunStatus) -> Result<()>;
}

impl<S: TrackingSink + ?Sized> TrackingSink for Box<S> {
    fn create_run(&mut self, run_name: Option<&str>) -> Result<RunRecord> {
        (**self).create_run(run_name)
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        (**self).log_param(run_id, key, value)
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        (**self).log_metric(run_id, key, value, step)
    }

    fn log_artifact(
        &mut self,
        run_id: &str,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<()> {
        (**self).log_artifact(run_id, local_path, artifact_path)
    }

    fn set_status(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        (**self).set_status(run_id, status)
    }
}
