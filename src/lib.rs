//! # docbatch
//!
//! Sequential batch orchestrator for document-to-markdown conversion services.
//!
//! ## Overview
//!
//! docbatch walks an input directory, sends each document to a conversion
//! service one at a time, and writes one markdown artifact per input:
//! - **Single batch** - at most one batch runs per process; status is always a
//!   consistent snapshot
//! - **Resilient** - rate-limited failures trigger backoff, and a circuit breaker
//!   aborts the batch after too many failures in a row
//! - **Self-cleaning** - zero-byte artifacts are removed once the batch ends
//! - **Consolidation** - all artifacts can be merged into one document in
//!   natural filename order (`2_x` before `10_x`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use docbatch::{Config, Orchestrator};
//! use docbatch::conversion::HttpConversionClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let client = Arc::new(HttpConversionClient::new(&config.conversion)?);
//!     let orchestrator = Orchestrator::new(config, client).await?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     orchestrator.start_batch().await?;
//!     let status = orchestrator.wait_for_completion().await;
//!     println!("converted {} of {}", status.processed_files, status.total_files);
//!
//!     orchestrator.consolidate().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Removal of zero-byte artifacts
pub mod cleanup;
/// Configuration types
pub mod config;
/// Natural-order consolidation of artifacts
pub mod consolidate;
/// Conversion client abstraction and implementations
pub mod conversion;
/// Error types
pub mod error;
/// Top-level orchestrator
pub mod orchestrator;
/// Sequential batch processor
pub mod processor;
/// Failure classification and circuit breaking
pub mod resilience;
/// Batch status tracking
pub mod status;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, ConversionConfig, ResilienceConfig};
pub use conversion::{ConversionClient, HttpConversionClient, ScriptedConversionClient};
pub use error::{
    ApiError, BatchError, ConsolidationError, ConversionError, Error, ErrorDetail, Result,
    ToHttpStatus,
};
pub use orchestrator::Orchestrator;
pub use resilience::{CircuitBreaker, Decision, MarkerPolicy, ResiliencePolicy};
pub use status::StatusTracker;
pub use types::{
    AbortReason, BatchState, ConsolidationReport, Event, FailureClass, FileError, StartResponse,
    StatusSnapshot,
};

/// Wait for a termination signal, then stop the running batch.
///
/// Returns once the batch worker (if any) has exited.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use docbatch::{Config, Orchestrator, ScriptedConversionClient, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(ScriptedConversionClient::new());
///     let orchestrator = Orchestrator::new(Config::default(), client).await?;
///
///     run_with_shutdown(&orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: &Orchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
