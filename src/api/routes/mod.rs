//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`process`] - Batch start, status, stop, consolidation and cleanup
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod process;
mod system;

pub use process::*;
pub use system::*;

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable message
    pub message: String,
}

/// Result of a cleanup request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    /// Removed zero-byte artifacts
    pub removed: Vec<String>,
}
