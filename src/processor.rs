//! Sequential batch processor.
//!
//! Converts the files of one batch strictly one after another, records every
//! outcome in the [`StatusTracker`], and asks the resilience policy what to do
//! after each failure. Aborts are cooperative: the processor only ever stops
//! between two files, never in the middle of a conversion.

use crate::cleanup::clean_empty_artifacts;
use crate::config::Config;
use crate::conversion::{ConversionClient, artifact_name, join_segments};
use crate::error::Error;
use crate::resilience::{CircuitBreaker, Decision, ResiliencePolicy};
use crate::status::{BatchRun, StatusTracker};
use crate::types::{AbortReason, Event, FailureClass, FileOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one batch run from first file to cleanup
#[derive(Clone)]
pub struct BatchProcessor {
    tracker: StatusTracker,
    client: Arc<dyn ConversionClient>,
    policy: Arc<dyn ResiliencePolicy>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
}

impl BatchProcessor {
    /// Create a processor sharing the given tracker and event channel
    pub fn new(
        tracker: StatusTracker,
        client: Arc<dyn ConversionClient>,
        policy: Arc<dyn ResiliencePolicy>,
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            tracker,
            client,
            policy,
            config,
            event_tx,
        }
    }

    /// Process `files` in order
    ///
    /// Must only be called after [`StatusTracker::try_start`] accepted the same
    /// file list; `stop` is the token it returned. Always ends with the cleanup
    /// pass and [`StatusTracker::finish`], and returns the final run.
    pub async fn run(&self, files: Vec<String>, stop: CancellationToken) -> BatchRun {
        let total = files.len();
        let resilience = &self.config.resilience;
        let mut breaker = CircuitBreaker::new(resilience);
        let mut abort: Option<AbortReason> = None;

        info!(
            total,
            client = self.client.name(),
            "starting batch conversion"
        );

        if let Err(e) = tokio::fs::create_dir_all(&self.config.output_dir).await {
            abort = Some(AbortReason::Fatal {
                file: self.config.output_dir.display().to_string(),
                error: format!("failed to create output directory: {e}"),
            });
        }

        if abort.is_none() {
            for (index, file) in files.iter().enumerate() {
                if stop.is_cancelled() {
                    abort = Some(AbortReason::Stopped);
                    break;
                }

                self.tracker.record_progress(index, file).await;
                self.event_tx
                    .send(Event::FileStarted {
                        index,
                        file: file.clone(),
                    })
                    .ok();
                debug!(index, total, file = %file, "converting file");

                let decision = match self.convert_file(file).await {
                    FileOutcome::Success(artifact) => {
                        self.tracker.record_success().await;
                        breaker.record_success();
                        info!(file = %file, ?artifact, "file converted");
                        self.event_tx
                            .send(Event::FileConverted {
                                file: file.clone(),
                                artifact,
                            })
                            .ok();
                        Decision::Continue
                    }
                    FileOutcome::EmptyOutput => {
                        self.record_failure(
                            &mut breaker,
                            file,
                            FailureClass::Transient,
                            "conversion produced empty output".to_string(),
                        )
                        .await
                    }
                    FileOutcome::Failure(class, message) => {
                        self.record_failure(&mut breaker, file, class, message).await
                    }
                };

                let is_last = index + 1 == total;
                match decision {
                    Decision::Abort(reason) => {
                        abort = Some(reason);
                        break;
                    }
                    Decision::Backoff(delay) if !is_last => {
                        warn!(
                            file = %file,
                            delay_ms = delay.as_millis() as u64,
                            "rate limited, backing off before next file"
                        );
                        self.event_tx
                            .send(Event::BackingOff {
                                delay_ms: delay.as_millis() as u64,
                            })
                            .ok();
                        pause(delay, &stop).await;
                    }
                    Decision::Backoff(_) | Decision::Continue => {}
                }

                if !is_last && !resilience.inter_file_delay.is_zero() {
                    pause(resilience.inter_file_delay, &stop).await;
                }
            }
        }

        if let Some(reason) = &abort {
            warn!(reason = %reason, "batch ended early");
            self.tracker.record_abort(reason.clone()).await;
            self.event_tx
                .send(Event::BatchAborted {
                    reason: reason.clone(),
                })
                .ok();
        }

        match clean_empty_artifacts(&self.config.output_dir).await {
            Ok(removed) => {
                self.event_tx.send(Event::CleanupComplete { removed }).ok();
            }
            Err(e) => {
                warn!(error = %e, "cleanup pass failed");
            }
        }

        self.tracker.finish().await;
        let run = self.tracker.run().await;

        info!(
            total,
            processed = run.processed_count,
            failed = run.errors.len(),
            "batch conversion finished"
        );
        self.event_tx
            .send(Event::BatchFinished {
                processed_files: run.processed_count,
                failed_files: run.errors.len(),
            })
            .ok();

        run
    }

    /// Convert one file and write its artifact
    async fn convert_file(&self, file: &str) -> FileOutcome {
        let input = self.config.input_dir.join(file);
        let artifact = self.config.output_dir.join(artifact_name(file));

        let segments = match self.client.convert(&input).await {
            Ok(segments) => segments,
            Err(e) => {
                let err = Error::Conversion(e);
                return FileOutcome::Failure(self.policy.classify(&err), err.to_string());
            }
        };

        let text = join_segments(&segments);
        if let Err(e) = tokio::fs::write(&artifact, text.as_bytes()).await {
            let message = format!("failed to write {}: {}", artifact.display(), e);
            let class = self.policy.classify(&Error::Io(e));
            return FileOutcome::Failure(class, message);
        }

        if text.is_empty() {
            FileOutcome::EmptyOutput
        } else {
            FileOutcome::Success(artifact)
        }
    }

    async fn record_failure(
        &self,
        breaker: &mut CircuitBreaker,
        file: &str,
        class: FailureClass,
        message: String,
    ) -> Decision {
        warn!(file = %file, ?class, error = %message, "file failed");
        self.tracker.record_failure(file, message.clone()).await;
        let decision = breaker.record_failure(class, file, &message);
        self.event_tx
            .send(Event::FileFailed {
                file: file.to_string(),
                error: message,
                class,
            })
            .ok();
        decision
    }
}

/// Sleep for `delay` unless `stop` fires first
async fn pause(delay: Duration, stop: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = stop.cancelled() => {
            debug!("pause interrupted by stop request");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{Scripted, ScriptedConversionClient};
    use crate::resilience::MarkerPolicy;
    use crate::types::BatchState;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        config: Arc<Config>,
        tracker: StatusTracker,
        client: ScriptedConversionClient,
        processor: BatchProcessor,
        events: broadcast::Receiver<Event>,
    }

    fn harness(inputs: &[&str]) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = Config {
            input_dir: dir.path().join("in"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        config.resilience.rate_limit_backoff = Duration::from_millis(5);
        config.resilience.inter_file_delay = Duration::ZERO;
        std::fs::create_dir_all(&config.input_dir).unwrap();
        for name in inputs {
            std::fs::write(config.input_dir.join(name), b"input").unwrap();
        }

        let config = Arc::new(config);
        let tracker = StatusTracker::new();
        let client = ScriptedConversionClient::new();
        let (event_tx, events) = broadcast::channel(256);
        let processor = BatchProcessor::new(
            tracker.clone(),
            Arc::new(client.clone()),
            Arc::new(MarkerPolicy::default()),
            config.clone(),
            event_tx,
        );
        Harness {
            _dir: dir,
            config,
            tracker,
            client,
            processor,
            events,
        }
    }

    fn names(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    async fn run(h: &Harness, files: &[&str]) -> BatchRun {
        let stop = h.tracker.try_start(names(files)).await.unwrap();
        h.processor.run(names(files), stop).await
    }

    #[tokio::test]
    async fn writes_joined_segments_per_file() {
        let h = harness(&["a.pdf", "b.docx"]);
        h.client.push(
            "a.pdf",
            Scripted::Pages(vec!["page one".into(), "page two".into()]),
        );

        let run = run(&h, &["a.pdf", "b.docx"]).await;

        assert_eq!(run.state, BatchState::Done);
        assert_eq!(run.processed_count, 2);
        assert!(run.errors.is_empty());
        assert!(run.abort_reason.is_none());
        let a = std::fs::read_to_string(h.config.output_dir.join("a.md")).unwrap();
        assert_eq!(a, "page one\n\n---\n\npage two");
        let b = std::fs::read_to_string(h.config.output_dir.join("b.md")).unwrap();
        assert_eq!(b, "# b.docx");
    }

    #[tokio::test]
    async fn empty_output_is_a_failure_and_gets_cleaned() {
        let h = harness(&["a.pdf", "b.pdf"]);
        h.client.push("a.pdf", Scripted::Pages(vec![]));

        let run = run(&h, &["a.pdf", "b.pdf"]).await;

        assert_eq!(run.processed_count, 1);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.errors[0].file, "a.pdf");
        assert!(run.errors[0].error.contains("empty output"));
        assert!(!h.config.output_dir.join("a.md").exists());
        assert!(h.config.output_dir.join("b.md").exists());
    }

    #[tokio::test]
    async fn three_rate_limits_abort_the_batch() {
        let files = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"];
        let h = harness(&files);
        h.client
            .set_fallback(Scripted::RateLimited("quota exhausted".into()));

        let run = run(&h, &files).await;

        assert_eq!(run.state, BatchState::Done);
        assert_eq!(run.errors.len(), 3);
        assert_eq!(run.processed_count, 0);
        assert_eq!(
            run.abort_reason,
            Some(AbortReason::RateLimitThreshold { count: 3 })
        );
        assert_eq!(h.client.calls(), names(&["1.pdf", "2.pdf", "3.pdf"]));
    }

    #[tokio::test]
    async fn five_mixed_failures_abort_the_batch() {
        let files = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf", "6.pdf"];
        let h = harness(&files);
        h.client.set_fallback(Scripted::Fail("parser crashed".into()));
        h.client.push("2.pdf", Scripted::RateLimited("slow down".into()));
        h.client.push("4.pdf", Scripted::RateLimited("slow down".into()));

        let run = run(&h, &files).await;

        assert_eq!(run.errors.len(), 5);
        assert_eq!(
            run.abort_reason,
            Some(AbortReason::ConsecutiveErrors { count: 5 })
        );
        assert_eq!(h.client.calls().len(), 5);
    }

    #[tokio::test]
    async fn success_resets_the_breaker() {
        let files = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf"];
        let h = harness(&files);
        h.client.set_fallback(Scripted::RateLimited("429".into()));
        h.client.push("3.pdf", Scripted::Pages(vec!["ok".into()]));

        let run = run(&h, &files).await;

        assert_eq!(run.processed_count, 1);
        assert_eq!(run.errors.len(), 4);
        assert!(run.abort_reason.is_none());
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let h = harness(&["a.pdf", "b.pdf"]);
        std::fs::create_dir_all(&h.config.output_dir).unwrap();
        // A directory where the artifact should go makes the write fail.
        std::fs::create_dir(h.config.output_dir.join("a.md")).unwrap();

        let run = run(&h, &["a.pdf", "b.pdf"]).await;

        assert_eq!(run.errors.len(), 1);
        assert!(matches!(
            run.abort_reason,
            Some(AbortReason::Fatal { ref file, .. }) if file == "a.pdf"
        ));
        assert_eq!(h.client.calls(), names(&["a.pdf"]));
    }

    #[tokio::test]
    async fn stop_request_prevents_next_file() {
        let h = harness(&["a.pdf", "b.pdf", "c.pdf"]);
        let files = names(&["a.pdf", "b.pdf", "c.pdf"]);
        let stop = h.tracker.try_start(files.clone()).await.unwrap();
        stop.cancel();

        let run = h.processor.run(files, stop).await;

        assert_eq!(run.state, BatchState::Done);
        assert_eq!(run.abort_reason, Some(AbortReason::Stopped));
        assert!(h.client.calls().is_empty());
    }

    #[tokio::test]
    async fn emits_lifecycle_events_in_order() {
        let mut h = harness(&["a.pdf"]);
        h.client.push("a.pdf", Scripted::Pages(vec!["text".into()]));

        run(&h, &["a.pdf"]).await;

        let mut kinds = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            kinds.push(match event {
                Event::FileStarted { .. } => "file_started",
                Event::FileConverted { .. } => "file_converted",
                Event::CleanupComplete { .. } => "cleanup_complete",
                Event::BatchFinished { .. } => "batch_finished",
                _ => "other",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "file_started",
                "file_converted",
                "cleanup_complete",
                "batch_finished"
            ]
        );
    }
}
