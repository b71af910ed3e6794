//! Run handle and report

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::ExitStatus;
use crate::tracking::{RunRecord, RunStatus};

/// Counters collected while consuming trainer output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Lines received from the trainer
    pub lines: u64,
    /// Metric samples parsed
    pub samples: u64,
    /// Samples the sink rejected
    pub dropped: u64,
}

/// A run opened by [`super::RunBridge::start_run`].
///
/// Owns the local copy of the run's state and the sticky step carried
/// between output lines.
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) record: RunRecord,
    pub(crate) step: u64,
    pub(crate) artifact: PathBuf,
    pub(crate) artifact_path: String,
    pub(crate) stats: RunStats,
}

impl RunHandle {
    pub(crate) fn new(record: RunRecord, artifact: PathBuf, artifact_path: String) -> Self {
        Self {
            record,
            step: 0,
            artifact,
            artifact_path,
            stats: RunStats::default(),
        }
    }

    /// Run ID assigned by the sink.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.record.run_id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.record.status()
    }

    /// Step the next line's metrics default to.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// File persisted when the run succeeds.
    #[must_use]
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Output counters so far.
    #[must_use]
    pub const fn stats(&self) -> RunStats {
        self.stats
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Run ID assigned by the sink
    pub run_id: String,
    /// Terminal state
    pub status: RunStatus,
    /// How the trainer exited
    pub exit: ExitStatus,
    /// Output counters
    pub stats: RunStats,
    /// Whether the artifact was persisted
    pub artifact_logged: bool,
}

impl RunReport {
    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match (self.status, self.exit.code()) {
            (RunStatus::Succeeded, _) => format!(
                "Run {} succeeded: {} metric samples logged",
                self.run_id,
                self.stats.samples - self.stats.dropped
            ),
            _ if self.exit.timed_out() => {
                format!("Run {} failed: training timed out", self.run_id)
            }
            (_, Some(code)) => {
                format!("Run {} failed: training exited with code {code}", self.run_id)
            }
            (_, None) => format!(
                "Run {} failed: training terminated without an exit code",
                self.run_id
            ),
        }
    }
}
