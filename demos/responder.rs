//! Responder - outlines bright regions in every frame it receives.
//!
//! ```text
//! cargo run --example responder -- tcp://0.0.0.0:50051
//! ```
//!
//! The endpoint comes from the first argument, then `FRAMEWIRE_ENDPOINT`,
//! then defaults to `tcp://0.0.0.0:50051`. Logs go to stderr; set `RUST_LOG`
//! to change the level.

use framewire::{Endpoint, PixelFormat, Processor, Server, SessionConfig, ThresholdDetector};
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "tcp://0.0.0.0:50051";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FRAMEWIRE_ENDPOINT").ok())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
        .parse()?;

    let detector = ThresholdDetector::new(PixelFormat::Bgra8, 200).min_pixels(16);
    let server = Server::bind(&endpoint, SessionConfig::default(), Processor::detect(detector)).await?;

    server
        .serve_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
