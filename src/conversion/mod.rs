//! Conversion client abstraction
//!
//! A [`ConversionClient`] turns one input document into an ordered sequence of
//! text segments (usually one per page). The batch processor joins the segments
//! with [`PAGE_SEPARATOR`] to build the artifact.
//!
//! Implementations:
//! - [`HttpConversionClient`] - job-based HTTP parsing service
//! - [`ScriptedConversionClient`] - deterministic stub for tests and demos

use crate::error::ConversionError;
use async_trait::async_trait;
use std::path::Path;

mod http;
mod scripted;

pub use http::HttpConversionClient;
pub use scripted::{Scripted, ScriptedConversionClient};

/// Marker inserted between consecutive segments of one artifact
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Converts a document into ordered text segments
///
/// Implementations must return segments in document order; the processor
/// preserves that order exactly. Errors are per-file: the processor records
/// them and lets the resilience policy decide whether the batch continues.
#[async_trait]
pub trait ConversionClient: Send + Sync {
    /// Convert the file at `path`
    async fn convert(&self, path: &Path) -> Result<Vec<String>, ConversionError>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Join segments into artifact text
pub fn join_segments(segments: &[String]) -> String {
    segments.join(PAGE_SEPARATOR)
}

/// Artifact file name for an input file: its stem plus `.md`
///
/// Only the last extension is dropped, so `report.v2.pdf` becomes `report.v2.md`.
pub fn artifact_name(input: &str) -> String {
    let stem = Path::new(input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(input);
    format!("{stem}.{}", crate::consolidate::ARTIFACT_EXTENSION)
}
