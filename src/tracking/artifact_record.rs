//! Artifact Record - files attached to a finished run

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artifact Record represents a local file persisted to the sink.
///
/// `artifact_path` is the directory inside the run's artifact root the
/// file is stored under (e.g. `model_adapters`); the file keeps its own
/// name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    local_path: PathBuf,
    artifact_path: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `local_path` - File that was uploaded
    /// * `artifact_path` - Destination directory in the run's artifact root
    /// * `size_bytes` - Size of the file in bytes
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        local_path: impl Into<PathBuf>,
        artifact_path: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            local_path: local_path.into(),
            artifact_path: artifact_path.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the uploaded file's local path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Get the destination directory inside the artifact root.
    #[must_use]
    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
