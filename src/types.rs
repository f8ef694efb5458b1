//! Core types for docbatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Lifecycle of the process-wide batch run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// No batch has run since startup
    #[default]
    Idle,
    /// A batch is being processed
    Running,
    /// The most recent batch finished (completed, aborted or stopped)
    Done,
}

/// A per-file failure recorded in the batch error list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileError {
    /// Input file name
    pub file: String,
    /// Failure description
    pub error: String,
}

/// Classification of a failed file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Upstream quota or rate limiting; triggers backoff
    RateLimited,
    /// Any other recoverable per-file failure
    Transient,
    /// Unrecoverable local condition; aborts the batch
    Fatal,
}

/// Result of converting one input file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    /// Artifact written with content
    Success(PathBuf),
    /// The service returned nothing; the zero-byte artifact is left for cleanup
    EmptyOutput,
    /// Conversion or artifact write failed
    Failure(FailureClass, String),
}

/// Why a batch stopped before its last file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Too many rate-limited failures
    RateLimitThreshold {
        /// Rate-limited failures counted when the breaker tripped
        count: u32,
    },
    /// Too many consecutive failures of any class
    ConsecutiveErrors {
        /// Consecutive failures counted when the breaker tripped
        count: u32,
    },
    /// A fatal failure
    Fatal {
        /// The file being processed
        file: String,
        /// The fatal error
        error: String,
    },
    /// A caller requested the batch to stop
    Stopped,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::RateLimitThreshold { count } => {
                write!(f, "aborted after {count} rate-limited failures")
            }
            AbortReason::ConsecutiveErrors { count } => {
                write!(f, "aborted after {count} consecutive failures")
            }
            AbortReason::Fatal { file, error } => write!(f, "fatal error on {file}: {error}"),
            AbortReason::Stopped => write!(f, "stopped on request"),
        }
    }
}

/// Point-in-time copy of the batch run, as served to polling clients
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatusSnapshot {
    /// Whether a batch is running
    pub is_running: bool,
    /// Lifecycle state
    pub state: BatchState,
    /// File currently being converted
    pub current_file: Option<String>,
    /// Progress percentage (0.0 to 100.0); 100 once the batch is done
    pub progress_percent: f32,
    /// Number of files in the batch
    pub total_files: usize,
    /// Files converted to non-empty artifacts
    pub processed_files: usize,
    /// Per-file failures in the order they happened
    pub errors: Vec<FileError>,
    /// When the batch started
    pub start_time: Option<DateTime<Utc>>,
    /// When the batch finished
    pub end_time: Option<DateTime<Utc>>,
    /// Set when the batch ended before its last file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
}

/// Accepted batch start
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StartResponse {
    /// Number of files queued for conversion
    pub total_files: usize,
    /// The files in processing order
    pub files: Vec<String>,
}

/// Summary of a consolidation pass
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsolidationReport {
    /// Path of the consolidated document
    pub output_path: PathBuf,
    /// Artifacts written, in order
    pub included: Vec<String>,
    /// Artifacts that could not be read
    pub skipped: Vec<String>,
}

/// Event emitted during the batch lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch was accepted
    BatchStarted {
        /// Number of files
        total_files: usize,
    },

    /// Conversion of a file is about to begin
    FileStarted {
        /// Zero-based position in the batch
        index: usize,
        /// Input file name
        file: String,
    },

    /// A file was converted to a non-empty artifact
    FileConverted {
        /// Input file name
        file: String,
        /// Written artifact
        artifact: PathBuf,
    },

    /// A file failed
    FileFailed {
        /// Input file name
        file: String,
        /// Failure description
        error: String,
        /// How the failure was classified
        class: FailureClass,
    },

    /// The processor is pausing after a rate-limited failure
    BackingOff {
        /// Pause length in milliseconds
        delay_ms: u64,
    },

    /// The circuit breaker or a stop request ended the batch early
    BatchAborted {
        /// Why the batch ended
        reason: AbortReason,
    },

    /// Empty artifacts were removed after the run
    CleanupComplete {
        /// Removed file names
        removed: Vec<String>,
    },

    /// The batch reached the done state
    BatchFinished {
        /// Files converted
        processed_files: usize,
        /// Files failed
        failed_files: usize,
    },

    /// A consolidated document was written
    Consolidated {
        /// Output path
        path: PathBuf,
        /// Number of artifacts merged
        artifacts: usize,
    },
}
