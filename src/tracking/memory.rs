//! Memory Sink - in-process storage for tracking data
//!
//! Backs offline runs (`track_run --offline`) and every bridge test. Status
//! changes go through [`RunRecord`] transitions, so an out-of-order
//! lifecycle is rejected here exactly as it would be by the bridge.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use super::{ArtifactRecord, MetricRecord, ParamRecord, RunRecord, RunStatus, TrackingSink};
use crate::{Error, Result};

/// Experiment ID used when none is configured (MLflow's default experiment).
pub const DEFAULT_EXPERIMENT_ID: &str = "0";

/// In-memory tracking sink.
///
/// ## Time-Series Queries
///
/// [`MemorySink::get_metrics_for_run`] returns metrics ordered by step.
/// The sort is stable, so samples sharing a step keep their logging order.
#[derive(Debug)]
pub struct MemorySink {
    experiment_id: String,
    runs: HashMap<String, RunRecord>,
    run_names: HashMap<String, String>,
    params: Vec<ParamRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::with_experiment(DEFAULT_EXPERIMENT_ID)
    }
}

impl MemorySink {
    /// Create a new empty sink for the default experiment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty sink whose runs belong to `experiment_id`.
    #[must_use]
    pub fn with_experiment(experiment_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            runs: HashMap::new(),
            run_names: HashMap::new(),
            params: Vec::new(),
            metrics: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    /// Check if the sink holds no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Get the number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of metric data points across all runs.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get the display name a run was created with.
    #[must_use]
    pub fn run_name(&self, run_id: &str) -> Option<&str> {
        self.run_names.get(run_id).map(String::as_str)
    }

    /// Get a run's parameter value.
    #[must_use]
    pub fn get_param(&self, run_id: &str, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.run_id() == run_id && p.key() == key)
            .map(ParamRecord::value)
    }

    /// Get all parameters of a run in logging order.
    #[must_use]
    pub fn params_for_run(&self, run_id: &str) -> Vec<&ParamRecord> {
        self.params.iter().filter(|p| p.run_id() == run_id).collect()
    }

    /// Get metrics for a specific run and key, ordered by step.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use finetrack::tracking::{MemorySink, RunStatus, TrackingSink};
    ///
    /// let mut sink = MemorySink::new();
    /// let run = sink.create_run(None)?;
    /// sink.set_status(run.run_id(), RunStatus::Running)?;
    ///
    /// for step in (0..100).rev() {
    ///     let loss = 1.0 / (step as f64 + 1.0);
    ///     sink.log_metric(run.run_id(), "train_loss", loss, step)?;
    /// }
    ///
    /// let curve = sink.get_metrics_for_run(run.run_id(), "train_loss");
    /// assert_eq!(curve.len(), 100);
    /// assert_eq!(curve[0].step(), 0);
    /// # Ok::<(), finetrack::Error>(())
    /// ```
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();

        metrics.sort_by_key(MetricRecord::step);

        metrics
    }

    /// Get all artifacts persisted for a run.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.run_id() == run_id)
            .collect()
    }

    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord> {
        self.runs
            .get_mut(run_id)
            .ok_or_else(|| Error::Sink(format!("unknown run '{run_id}'")))
    }

    fn require_run(&self, run_id: &str) -> Result<()> {
        if self.runs.contains_key(run_id) {
            Ok(())
        } else {
            Err(Error::Sink(format!("unknown run '{run_id}'")))
        }
    }
}

impl TrackingSink for MemorySink {
    fn create_run(&mut self, run_name: Option<&str>) -> Result<RunRecord> {
        let run = RunRecord::new(Uuid::new_v4().simple().to_string(), &self.experiment_id);
        if let Some(name) = run_name {
            self.run_names
                .insert(run.run_id().to_string(), name.to_string());
        }
        self.runs.insert(run.run_id().to_string(), run.clone());
        debug!(run_id = run.run_id(), "created in-memory run");
        Ok(run)
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.require_run(run_id)?;
        self.params.push(ParamRecord::new(run_id, key, value));
        Ok(())
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        self.require_run(run_id)?;
        self.metrics
            .push(MetricRecord::new(run_id, key, step, value));
        Ok(())
    }

    fn log_artifact(
        &mut self,
        run_id: &str,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<()> {
        self.require_run(run_id)?;
        let size_bytes = std::fs::metadata(local_path)?.len();
        self.artifacts.push(ArtifactRecord::new(
            run_id,
            local_path,
            artifact_path,
            size_bytes,
        ));
        Ok(())
    }

    fn set_status(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        let run = self.run_mut(run_id)?;
        if status == RunStatus::Running {
            run.start()
        } else {
            run.complete(status)
        }
    }
}
