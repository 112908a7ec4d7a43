//! Initiator - streams synthetic BGRA frames to a responder and logs what
//! comes back.
//!
//! ```text
//! cargo run --example responder &
//! cargo run --example initiator -- tcp://127.0.0.1:50051
//! ```
//!
//! Prints the session report as one JSON line on stdout when done. Ctrl-C
//! cancels the session.

use std::time::Duration;

use framewire::{write_stdout_json, Endpoint, Frame, PixelFormat, Session, SyntheticSource};
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:50051";

const ROWS: u32 = 240;
const COLS: u32 = 320;
const FRAMES: u64 = 300;
const FPS: u32 = 30;

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

    let session = Session::builder()
        .deadline(Duration::from_secs(60))
        .build();

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let source = SyntheticSource::new(ROWS, COLS, PixelFormat::Bgra8)
        .limit(FRAMES)
        .fps(FPS);

    let mut received: u64 = 0;
    let sink = move |frame: Frame| {
        received += 1;
        if received % u64::from(FPS) == 0 {
            tracing::info!(received, rows = frame.rows(), cols = frame.cols(), "Frames back");
        }
    };

    let report = session.initiate(&endpoint, source, sink).await?;
    write_stdout_json(&report)?;
    Ok(())
}
