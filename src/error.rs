//! Error types for finetrack
//!
//! A failed training process is not an error here: it is recorded as a
//! `Failed` run status. Lines that match no known pattern are not errors
//! either.

use thiserror::Error;

use crate::tracking::RunStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// finetrack error types
#[derive(Error, Debug)]
pub enum Error {
    /// A dataset line could not be parsed into a JSON object
    #[error("Malformed record on line {line}: {message}")]
    InputFormat {
        /// 1-based line number in the source file
        line: usize,
        /// Parser diagnostic
        message: String,
    },

    /// Tracking sink unreachable or rejected a write
    #[error("Tracking sink error: {0}")]
    Sink(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Run lifecycle transition not allowed by the state machine
    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// State the run was in
        from: RunStatus,
        /// State that was requested
        to: RunStatus,
    },

    /// Output channel closed before the process was reaped
    #[error("Process output channel closed (reader thread panicked)")]
    QueueClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
