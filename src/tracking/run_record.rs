//! Run Record - lifecycle of one tracked training execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Status of a run.
///
/// ```text
/// Created ──> Running ──┬──> Succeeded
///                       └──> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is opened in the sink but the trainer has not started.
    Created,
    /// Trainer output is being consumed.
    Running,
    /// Trainer exited with code 0.
    Succeeded,
    /// Trainer exited non-zero, was killed, or never started.
    Failed,
}

impl RunStatus {
    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the run state machine.
    ///
    /// A Created run may only fail directly, when it is aborted before the
    /// trainer starts.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running | Self::Failed)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

/// Run Record represents a single execution of the external trainer.
///
/// Transitions are checked: once terminal, a record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new run record in Created status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Identifier assigned by the sink
    /// * `experiment_id` - ID of the experiment the run belongs to
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            status: RunStatus::Created,
            started_at: None,
            ended_at: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Start the run, transitioning from Created to Running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the run is Created.
    pub fn start(&mut self) -> Result<()> {
        self.transition(RunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Complete the run with the given terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if `status` is not terminal, if
    /// the run already is, or for Succeeded on a run that never started.
    pub fn complete(&mut self, status: RunStatus) -> Result<()> {
        self.transition(status)?;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
