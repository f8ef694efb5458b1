//! REST API server example
//!
//! Runs docbatch against an HTTP parsing service, controlled over HTTP.
//!
//! Configuration comes from the environment (`INPUT_DIR`, `OUTPUT_DIR`,
//! `CONSOLIDATED_FILE`, `CONVERSION_API_URL`, `CONVERSION_API_KEY`).
//!
//! After starting, you can:
//! - Start a batch via POST http://localhost:5000/process/start
//! - Poll progress via GET http://localhost:5000/process/status
//! - Stream events via GET http://localhost:5000/events
//! - Merge the results via POST http://localhost:5000/process/consolidate

use docbatch::api::start_api_server;
use docbatch::{Config, HttpConversionClient, Orchestrator, run_with_shutdown};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let client = Arc::new(HttpConversionClient::new(&config.conversion)?);
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), client).await?);
    let config = Arc::new(config);
    let address = config.api.bind_address;

    println!("Starting docbatch REST API server");
    println!("Input directory:  {}", config.input_dir.display());
    println!("Output directory: {}", config.output_dir.display());
    println!("Conversion API:   {}", config.conversion.base_url);
    println!();
    println!("Example commands:");
    println!("  curl -X POST http://{address}/process/start");
    println!("  curl http://{address}/process/status");
    println!("  curl -N http://{address}/events");
    println!("  curl -X POST http://{address}/process/consolidate");
    println!();
    println!("Press Ctrl+C to stop");

    let shutdown = {
        let orchestrator = orchestrator.clone();
        async move {
            if let Err(e) = run_with_shutdown(&orchestrator).await {
                eprintln!("Error during shutdown: {e}");
            }
        }
    };
    start_api_server(orchestrator, config, shutdown).await?;

    Ok(())
}
