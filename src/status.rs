//! Process-wide batch status tracking.
//!
//! [`StatusTracker`] owns the single [`BatchRun`] record. The record is never
//! exposed by reference; callers mutate it through the `record_*` methods and
//! read it through [`StatusTracker::snapshot`], which returns a consistent copy.

use crate::error::BatchError;
use crate::types::{AbortReason, BatchState, FileError, StatusSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The in-flight (or most recently finished) batch
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchRun {
    /// Input file names in processing order
    pub files: Vec<String>,
    /// Position of the file being (or last) processed
    pub current_index: usize,
    /// File being converted, cleared on finish
    pub current_file: Option<String>,
    /// Files converted to non-empty artifacts
    pub processed_count: usize,
    /// Per-file failures
    pub errors: Vec<FileError>,
    /// Start timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// End timestamp
    pub ended_at: Option<DateTime<Utc>>,
    /// Lifecycle state
    pub state: BatchState,
    /// Why the run ended early, if it did
    pub abort_reason: Option<AbortReason>,
}

impl BatchRun {
    /// Progress in percent; 100 once done
    pub fn progress_percent(&self) -> f32 {
        match self.state {
            BatchState::Idle => 0.0,
            BatchState::Done => 100.0,
            BatchState::Running if self.files.is_empty() => 0.0,
            BatchState::Running => (self.current_index as f32 / self.files.len() as f32) * 100.0,
        }
    }

    fn to_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_running: self.state == BatchState::Running,
            state: self.state,
            current_file: self.current_file.clone(),
            progress_percent: self.progress_percent(),
            total_files: self.files.len(),
            processed_files: self.processed_count,
            errors: self.errors.clone(),
            start_time: self.started_at,
            end_time: self.ended_at,
            abort_reason: self.abort_reason.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    run: BatchRun,
    stop: CancellationToken,
}

/// Shared single-batch state (cloneable - the state is Arc-wrapped)
#[derive(Clone, Debug, Default)]
pub struct StatusTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl StatusTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh running batch unless one is already running
    ///
    /// Returns the stop token for the new run. A rejected start leaves the
    /// running batch untouched.
    pub async fn try_start(&self, files: Vec<String>) -> Result<CancellationToken, BatchError> {
        let mut inner = self.inner.lock().await;
        if inner.run.state == BatchState::Running {
            return Err(BatchError::AlreadyRunning);
        }

        let stop = CancellationToken::new();
        inner.stop = stop.clone();
        inner.run = BatchRun {
            files,
            current_index: 0,
            current_file: None,
            processed_count: 0,
            errors: Vec::new(),
            started_at: Some(Utc::now()),
            ended_at: None,
            state: BatchState::Running,
            abort_reason: None,
        };
        Ok(stop)
    }

    /// Mark `filename` at `index` as the file about to be converted
    pub async fn record_progress(&self, index: usize, filename: &str) {
        let mut inner = self.inner.lock().await;
        inner.run.current_index = index.max(inner.run.current_index);
        inner.run.current_file = Some(filename.to_string());
    }

    /// Count a successfully converted file
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.run.processed_count += 1;
    }

    /// Append a per-file failure
    pub async fn record_failure(&self, file: &str, message: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.run.errors.push(FileError {
            file: file.to_string(),
            error: message.into(),
        });
    }

    /// Remember why the batch is ending early
    pub async fn record_abort(&self, reason: AbortReason) {
        let mut inner = self.inner.lock().await;
        inner.run.abort_reason = Some(reason);
    }

    /// Ask the running batch to stop before its next file
    pub async fn request_stop(&self) -> Result<(), BatchError> {
        let inner = self.inner.lock().await;
        if inner.run.state != BatchState::Running {
            return Err(BatchError::NotRunning);
        }
        inner.stop.cancel();
        Ok(())
    }

    /// Move the batch to done
    pub async fn finish(&self) {
        let mut inner = self.inner.lock().await;
        inner.run.state = BatchState::Done;
        inner.run.ended_at = Some(Utc::now());
        inner.run.current_file = None;
    }

    /// Whether a batch is running
    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.run.state == BatchState::Running
    }

    /// Copy of the current run
    pub async fn run(&self) -> BatchRun {
        self.inner.lock().await.run.clone()
    }

    /// Consistent status view for polling clients
    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.lock().await.run.to_snapshot()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn new_tracker_is_idle() {
        let tracker = StatusTracker::new();
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.state, BatchState::Idle);
        assert!(!snapshot.is_running);
        assert_eq!(snapshot.progress_percent, 0.0);
        assert_eq!(snapshot.total_files, 0);
    }

    #[tokio::test]
    async fn start_installs_fresh_run() {
        let tracker = StatusTracker::new();
        tracker.try_start(files(&["a.pdf", "b.pdf"])).await.unwrap();

        let snapshot = tracker.snapshot().await;
        assert!(snapshot.is_running);
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.processed_files, 0);
        assert!(snapshot.errors.is_empty());
        assert!(snapshot.start_time.is_some());
        assert!(snapshot.end_time.is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_mutation() {
        let tracker = StatusTracker::new();
        tracker.try_start(files(&["a.pdf", "b.pdf"])).await.unwrap();
        tracker.record_progress(1, "b.pdf").await;
        tracker.record_success().await;
        let before = tracker.run().await;

        let result = tracker.try_start(files(&["other.pdf"])).await;
        assert!(matches!(result, Err(BatchError::AlreadyRunning)));
        assert_eq!(tracker.run().await, before);
    }

    #[tokio::test]
    async fn progress_never_moves_backwards() {
        let tracker = StatusTracker::new();
        tracker.try_start(files(&["a.pdf", "b.pdf", "c.pdf"])).await.unwrap();
        tracker.record_progress(2, "c.pdf").await;
        tracker.record_progress(1, "b.pdf").await;

        let run = tracker.run().await;
        assert_eq!(run.current_index, 2);
        assert_eq!(run.current_file.as_deref(), Some("b.pdf"));
    }

    #[tokio::test]
    async fn finish_then_restart_resets_run() {
        let tracker = StatusTracker::new();
        tracker.try_start(files(&["a.pdf"])).await.unwrap();
        tracker.record_progress(0, "a.pdf").await;
        tracker.record_failure("a.pdf", "boom").await;
        tracker.finish().await;

        let done = tracker.snapshot().await;
        assert_eq!(done.state, BatchState::Done);
        assert_eq!(done.progress_percent, 100.0);
        assert!(done.current_file.is_none());
        assert!(done.end_time.is_some());
        assert_eq!(done.errors.len(), 1);

        tracker.try_start(files(&["c.pdf"])).await.unwrap();
        let fresh = tracker.snapshot().await;
        assert!(fresh.errors.is_empty());
        assert_eq!(fresh.total_files, 1);
        assert!(fresh.end_time.is_none());
    }

    #[tokio::test]
    async fn progress_tracks_current_index() {
        let tracker = StatusTracker::new();
        tracker
            .try_start(files(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]))
            .await
            .unwrap();
        tracker.record_progress(0, "a.pdf").await;
        assert_eq!(tracker.snapshot().await.progress_percent, 0.0);
        tracker.record_progress(2, "c.pdf").await;
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.progress_percent, 50.0);
        assert_eq!(snapshot.current_file.as_deref(), Some("c.pdf"));
    }

    #[tokio::test]
    async fn stop_requires_running_batch() {
        let tracker = StatusTracker::new();
        assert!(matches!(
            tracker.request_stop().await,
            Err(BatchError::NotRunning)
        ));

        let token = tracker.try_start(files(&["a.pdf"])).await.unwrap();
        assert!(!token.is_cancelled());
        tracker.request_stop().await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn concurrent_readers_see_consistent_counts() {
        let tracker = StatusTracker::new();
        let names: Vec<String> = (0..50).map(|i| format!("{i}.pdf")).collect();
        tracker.try_start(names.clone()).await.unwrap();

        let writer = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                for (i, name) in names.iter().enumerate() {
                    tracker.record_progress(i, name).await;
                    if i % 3 == 0 {
                        tracker.record_failure(name, "failed").await;
                    } else {
                        tracker.record_success().await;
                    }
                    tokio::task::yield_now().await;
                }
                tracker.finish().await;
            })
        };

        let mut last_progress = 0.0;
        loop {
            let snapshot = tracker.snapshot().await;
            assert!(snapshot.processed_files + snapshot.errors.len() <= snapshot.total_files);
            assert!(snapshot.progress_percent >= last_progress);
            last_progress = snapshot.progress_percent;
            if !snapshot.is_running {
                break;
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
