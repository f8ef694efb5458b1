//! Top-level handle tying the tracker, processor and output maintenance together.
//!
//! The [`Orchestrator`] is what the REST layer (or an embedding application)
//! talks to. It owns:
//! - the single [`StatusTracker`] for the process
//! - the background worker running the [`BatchProcessor`]
//! - the output-directory guard that keeps consolidation and cleanup from
//!   racing a batch writing artifacts

use crate::cleanup::clean_empty_artifacts;
use crate::config::Config;
use crate::consolidate::{consolidate, sort_natural};
use crate::conversion::ConversionClient;
use crate::error::{BatchError, Error, Result};
use crate::processor::BatchProcessor;
use crate::resilience::{MarkerPolicy, ResiliencePolicy};
use crate::status::StatusTracker;
use crate::types::{AbortReason, ConsolidationReport, Event, StartResponse, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Orchestrator {
    /// Configuration (wrapped in Arc for sharing with the worker)
    pub(crate) config: Arc<Config>,
    /// Single batch state for the process
    tracker: StatusTracker,
    /// Worker logic, cloned into each spawned batch task
    processor: BatchProcessor,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Held by the batch worker for its whole run and by maintenance passes
    output_guard: Arc<Mutex<()>>,
    /// Handle of the most recent batch worker
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Orchestrator {
    /// Create an orchestrator using the default marker-based resilience policy
    pub async fn new(config: Config, client: Arc<dyn ConversionClient>) -> Result<Self> {
        let policy = Arc::new(MarkerPolicy::from_config(&config.resilience));
        Self::with_policy(config, client, policy).await
    }

    /// Create an orchestrator with a custom [`ResiliencePolicy`]
    ///
    /// Validates the configuration and creates the input and output directories.
    pub async fn with_policy(
        config: Config,
        client: Arc<dyn ConversionClient>,
        policy: Arc<dyn ResiliencePolicy>,
    ) -> Result<Self> {
        config.validate()?;

        for (label, dir) in [("input", &config.input_dir), ("output", &config.output_dir)] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        // Buffer of 1000 events; slow subscribers see a lag notice instead of blocking
        let (event_tx, _rx) = broadcast::channel(1000);
        let config = Arc::new(config);
        let tracker = StatusTracker::new();
        let processor = BatchProcessor::new(
            tracker.clone(),
            client,
            policy,
            config.clone(),
            event_tx.clone(),
        );

        Ok(Self {
            config,
            tracker,
            processor,
            event_tx,
            output_guard: Arc::new(Mutex::new(())),
            worker: Arc::new(Mutex::new(None)),
        })
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Input files with a supported extension, in natural order
    pub async fn discover_inputs(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.config.input_dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && self.config.is_supported(name)
            {
                files.push(name.to_string());
            }
        }

        sort_natural(&mut files);
        Ok(files)
    }

    /// Start a batch over every supported file in the input directory
    pub async fn start_batch(&self) -> Result<StartResponse> {
        // A running batch takes precedence over whatever the input scan reports
        if self.tracker.is_running().await {
            return Err(BatchError::AlreadyRunning.into());
        }
        let files = self.discover_inputs().await?;
        self.start_batch_with(files).await
    }

    /// Start a batch over `files` (names relative to the input directory)
    ///
    /// Returns as soon as the worker is spawned; poll [`Orchestrator::status`]
    /// or subscribe to events to follow it.
    pub async fn start_batch_with(&self, files: Vec<String>) -> Result<StartResponse> {
        if self.tracker.is_running().await {
            return Err(BatchError::AlreadyRunning.into());
        }
        if files.is_empty() {
            return Err(BatchError::NoFilesFound {
                dir: self.config.input_dir.clone(),
            }
            .into());
        }

        let stop = self.tracker.try_start(files.clone()).await?;
        info!(total = files.len(), "batch accepted");
        self.event_tx
            .send(Event::BatchStarted {
                total_files: files.len(),
            })
            .ok();

        let processor = self.processor.clone();
        let guard = self.output_guard.clone();
        let tracker = self.tracker.clone();
        let event_tx = self.event_tx.clone();
        let batch = files.clone();
        let handle = tokio::spawn(async move {
            let _output = guard.lock_owned().await;
            let run = tokio::spawn(async move { processor.run(batch, stop).await });
            if let Err(e) = run.await {
                close_crashed_run(&tracker, &event_tx, &join_failure(e)).await;
            }
        });
        *self.worker.lock().await = Some(handle);

        Ok(StartResponse {
            total_files: files.len(),
            files,
        })
    }

    /// Consistent copy of the batch status
    pub async fn status(&self) -> StatusSnapshot {
        self.tracker.snapshot().await
    }

    /// Ask the running batch to stop before its next file
    pub async fn stop_batch(&self) -> Result<()> {
        self.tracker.request_stop().await?;
        info!("stop requested");
        Ok(())
    }

    /// Wait for the most recent batch worker to exit and return the final status
    pub async fn wait_for_completion(&self) -> StatusSnapshot {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "batch worker terminated abnormally");
        }
        self.tracker.snapshot().await
    }

    /// Stop a running batch (if any) and wait for its worker to exit
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down orchestrator");
        match self.tracker.request_stop().await {
            Ok(()) | Err(BatchError::NotRunning) => {}
            Err(e) => return Err(e.into()),
        }
        self.wait_for_completion().await;
        Ok(())
    }

    /// Merge all artifacts into the consolidated document
    pub async fn consolidate(&self) -> Result<ConsolidationReport> {
        let _output = self.claim_output("consolidate").await?;

        let report = consolidate(&self.config.output_dir, &self.config.consolidated_path()).await?;
        self.event_tx
            .send(Event::Consolidated {
                path: report.output_path.clone(),
                artifacts: report.included.len(),
            })
            .ok();
        Ok(report)
    }

    /// Remove zero-byte artifacts from the output directory
    pub async fn clean_output(&self) -> Result<Vec<String>> {
        let _output = self.claim_output("clean").await?;

        let removed = clean_empty_artifacts(&self.config.output_dir).await?;
        self.event_tx
            .send(Event::CleanupComplete {
                removed: removed.clone(),
            })
            .ok();
        Ok(removed)
    }

    /// Exclusive access to the output directory, refused while a batch owns it
    async fn claim_output(&self, operation: &str) -> Result<MutexGuard<'_, ()>> {
        let busy = || {
            Error::Batch(BatchError::Busy {
                operation: operation.to_string(),
            })
        };

        let guard = self.output_guard.try_lock().map_err(|_| busy())?;
        // A just-accepted batch may not have reached the guard yet
        if self.tracker.is_running().await {
            return Err(busy());
        }
        Ok(guard)
    }
}

/// Describe why a worker task ended without returning
fn join_failure(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Finish a run whose worker died before reaching [`StatusTracker::finish`]
async fn close_crashed_run(
    tracker: &StatusTracker,
    event_tx: &broadcast::Sender<Event>,
    cause: &str,
) {
    let run = tracker.run().await;
    error!(error = %cause, current_file = ?run.current_file, "batch worker terminated abnormally");

    let reason = AbortReason::Fatal {
        file: run.current_file.unwrap_or_default(),
        error: format!("batch worker crashed: {cause}"),
    };
    tracker.record_abort(reason.clone()).await;
    tracker.finish().await;

    event_tx.send(Event::BatchAborted { reason }).ok();
    event_tx
        .send(Event::BatchFinished {
            processed_files: run.processed_count,
            failed_files: run.errors.len(),
        })
        .ok();
}
