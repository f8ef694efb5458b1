//! Error types for docbatch
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Batch, Conversion, Consolidation)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for docbatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docbatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Batch lifecycle error (start/stop/exclusivity)
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// A single file failed to convert
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Consolidation of artifacts failed
    #[error("consolidation error: {0}")]
    Consolidation(#[from] ConsolidationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Batch lifecycle errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// A batch is already running; only one may run at a time
    #[error("processing already in progress")]
    AlreadyRunning,

    /// The input directory holds no file with a supported extension
    #[error("no files to process in {dir}")]
    NoFilesFound {
        /// The input directory that was scanned
        dir: PathBuf,
    },

    /// A stop was requested but no batch is running
    #[error("no batch is running")]
    NotRunning,

    /// The output directory is in use by a batch run or another maintenance pass
    #[error("cannot {operation} while processing")]
    Busy {
        /// The rejected operation (e.g., "consolidate", "clean")
        operation: String,
    },
}

/// Errors returned by a [`ConversionClient`](crate::conversion::ConversionClient)
///
/// The `Display` text of these variants is what the resilience policy inspects,
/// so rate-limit variants keep the upstream status phrasing intact.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The service refused the request because of rate limiting or quota
    #[error("HTTP 429 Too Many Requests: {message}")]
    RateLimited {
        /// Message returned by the service
        message: String,
    },

    /// The service answered with a non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request never produced a response (connect/reset/DNS)
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service accepted the job but reported that parsing failed
    #[error("conversion service reported failure: {0}")]
    Service(String),

    /// The job did not finish within the configured timeout
    #[error("conversion timed out after {seconds}s")]
    Timeout {
        /// Elapsed seconds before giving up
        seconds: u64,
    },

    /// The service response could not be understood
    #[error("malformed service response: {0}")]
    Malformed(String),

    /// The input file could not be read
    #[error("failed to read input {path}: {reason}")]
    Input {
        /// The input path
        path: PathBuf,
        /// Why reading failed
        reason: String,
    },
}

impl From<reqwest::Error> for ConversionError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return ConversionError::RateLimited {
                    message: e.to_string(),
                };
            }
            return ConversionError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        if e.is_decode() {
            return ConversionError::Malformed(e.to_string());
        }
        ConversionError::Transport(e.to_string())
    }
}

/// Consolidation errors
#[derive(Debug, Error)]
pub enum ConsolidationError {
    /// The artifact directory does not exist
    #[error("directory {path} does not exist")]
    NoSuchDirectory {
        /// The missing directory
        path: PathBuf,
    },

    /// No artifact was found in the directory
    #[error("no markdown artifacts found in {path}")]
    NoArtifacts {
        /// The scanned directory
        path: PathBuf,
    },

    /// The artifact directory could not be fully listed
    #[error("failed to scan {path}: {reason}")]
    ScanFailure {
        /// The directory being scanned
        path: PathBuf,
        /// The read error
        reason: String,
    },

    /// The consolidated document could not be written
    #[error("failed to write {path}: {reason}")]
    WriteFailure {
        /// The output path
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "already_running",
///     "message": "batch error: processing already in progress"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "already_running", "no_artifacts")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            Error::Batch(BatchError::NoFilesFound { .. }) => 400,
            Error::Batch(BatchError::AlreadyRunning) => 409,
            Error::Batch(BatchError::NotRunning) => 409,
            Error::Batch(BatchError::Busy { .. }) => 409,

            Error::Consolidation(ConsolidationError::NoSuchDirectory { .. }) => 404,
            Error::Consolidation(ConsolidationError::NoArtifacts { .. }) => 404,
            Error::Consolidation(ConsolidationError::ScanFailure { .. }) => 500,
            Error::Consolidation(ConsolidationError::WriteFailure { .. }) => 500,

            // 502 Bad Gateway - External service errors
            Error::Conversion(_) => 502,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Batch(e) => match e {
                BatchError::AlreadyRunning => "already_running",
                BatchError::NoFilesFound { .. } => "no_files_found",
                BatchError::NotRunning => "not_running",
                BatchError::Busy { .. } => "busy",
            },
            Error::Conversion(e) => match e {
                ConversionError::RateLimited { .. } => "rate_limited",
                _ => "conversion_failure",
            },
            Error::Consolidation(e) => match e {
                ConsolidationError::NoSuchDirectory { .. } => "no_such_directory",
                ConsolidationError::NoArtifacts { .. } => "no_artifacts",
                ConsolidationError::ScanFailure { .. } => "scan_failure",
                ConsolidationError::WriteFailure { .. } => "write_failure",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Batch(BatchError::NoFilesFound { dir }) => Some(serde_json::json!({
                "input_dir": dir,
            })),
            Error::Batch(BatchError::Busy { operation }) => Some(serde_json::json!({
                "operation": operation,
            })),
            Error::Consolidation(ConsolidationError::NoSuchDirectory { path })
            | Error::Consolidation(ConsolidationError::NoArtifacts { path })
            | Error::Consolidation(ConsolidationError::ScanFailure { path, .. })
            | Error::Consolidation(ConsolidationError::WriteFailure { path, .. }) => {
                Some(serde_json::json!({
                    "path": path,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, u16, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("output_dir".into()),
                },
                400,
                "config_error",
            ),
            (Error::Batch(BatchError::AlreadyRunning), 409, "already_running"),
            (
                Error::Batch(BatchError::NoFilesFound {
                    dir: PathBuf::from("InputFiles"),
                }),
                400,
                "no_files_found",
            ),
            (Error::Batch(BatchError::NotRunning), 409, "not_running"),
            (
                Error::Batch(BatchError::Busy {
                    operation: "consolidate".into(),
                }),
                409,
                "busy",
            ),
            (
                Error::Conversion(ConversionError::RateLimited {
                    message: "slow down".into(),
                }),
                502,
                "rate_limited",
            ),
            (
                Error::Conversion(ConversionError::Service("bad pdf".into())),
                502,
                "conversion_failure",
            ),
            (
                Error::Consolidation(ConsolidationError::NoSuchDirectory {
                    path: PathBuf::from("/missing"),
                }),
                404,
                "no_such_directory",
            ),
            (
                Error::Consolidation(ConsolidationError::NoArtifacts {
                    path: PathBuf::from("/empty"),
                }),
                404,
                "no_artifacts",
            ),
            (
                Error::Consolidation(ConsolidationError::ScanFailure {
                    path: PathBuf::from("/out"),
                    reason: "input/output error".into(),
                }),
                500,
                "scan_failure",
            ),
            (
                Error::Consolidation(ConsolidationError::WriteFailure {
                    path: PathBuf::from("/ro/Consolidated.md"),
                    reason: "read-only file system".into(),
                }),
                500,
                "write_failure",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                500,
                "io_error",
            ),
            (
                Error::ApiServerError("bind failed".into()),
                500,
                "api_server_error",
            ),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_status_and_code() {
        for (error, expected_status, expected_code) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "{expected_code} returned wrong status"
            );
            assert_eq!(error.error_code(), expected_code);
        }
    }

    #[test]
    fn rate_limited_display_keeps_status_phrase() {
        let err = ConversionError::RateLimited {
            message: "quota".into(),
        };
        assert!(err.to_string().contains("429 Too Many Requests"));
    }

    #[test]
    fn http_display_keeps_http_error_phrase() {
        let err = ConversionError::Http {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Service Unavailable");
    }

    #[test]
    fn api_error_from_scan_failure_has_path() {
        let api: ApiError = Error::Consolidation(ConsolidationError::ScanFailure {
            path: PathBuf::from("/out"),
            reason: "input/output error".into(),
        })
        .into();
        assert_eq!(api.error.code, "scan_failure");
        assert_eq!(api.error.details.unwrap()["path"], "/out");
    }

    #[test]
    fn api_error_from_no_files_found_has_input_dir() {
        let api: ApiError = Error::Batch(BatchError::NoFilesFound {
            dir: PathBuf::from("InputFiles"),
        })
        .into();
        assert_eq!(api.error.code, "no_files_found");
        let details = api.error.details.unwrap();
        assert_eq!(details["input_dir"], "InputFiles");
    }

    #[test]
    fn api_error_from_already_running_has_no_details() {
        let api: ApiError = Error::Batch(BatchError::AlreadyRunning).into();
        assert_eq!(api.error.code, "already_running");
        assert!(api.error.details.is_none());
        let json = serde_json::to_value(&api).unwrap();
        assert!(json["error"].get("details").is_none());
    }
}
