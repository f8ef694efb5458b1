//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time by utoipa and served at
//! `/openapi.json`.

use utoipa::OpenApi;

/// OpenAPI documentation for the docbatch REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "docbatch REST API",
        version = "0.1.0",
        description = "Start, monitor and stop batch document conversions, then consolidate the resulting markdown",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development server")
    ),
    paths(
        // Batch processing
        crate::api::routes::start_processing,
        crate::api::routes::processing_status,
        crate::api::routes::stop_processing,
        crate::api::routes::consolidate_files,
        crate::api::routes::cleanup_output,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(
        schemas(
            crate::types::BatchState,
            crate::types::FileError,
            crate::types::FailureClass,
            crate::types::AbortReason,
            crate::types::StatusSnapshot,
            crate::types::StartResponse,
            crate::types::ConsolidationReport,
            crate::types::Event,
            crate::api::routes::CleanupResponse,
            crate::api::routes::MessageResponse,
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "processing", description = "Batch conversion lifecycle"),
        (name = "system", description = "Health, events and API documentation")
    )
)]
pub struct ApiDoc;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_processing_paths() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_value(&spec).unwrap();
        let paths = json["paths"].as_object().unwrap();

        for path in [
            "/process/start",
            "/process/status",
            "/process/stop",
            "/process/consolidate",
            "/process/cleanup",
            "/health",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(json["components"]["schemas"]["StatusSnapshot"].is_object());
    }
}
