//! Headless viewer demo.
//!
//! Connects to the annotation backend for the configured stream, feeds
//! the capture pipeline from a synthetic test pattern (stand-in for a
//! real video surface), and exports the trailing replay window to disk
//! on SIGUSR1. Runs until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sightline_core::{RasterFrame, CLOCK_RATE};
use sightline_viewer::{SessionConfig, SharedClock, SharedSurface, ViewerSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sightline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SessionConfig::from_env();
    let clock = SharedClock::new();
    let surface = SharedSurface::new();

    let session = ViewerSession::start(config.clone(), clock.clone(), surface.clone(), surface.clone());

    let feeder_cancel = CancellationToken::new();
    let feeder = tokio::spawn(feed_test_pattern(
        surface,
        clock,
        config.capture_fps,
        feeder_cancel.clone(),
    ));

    let mut export_signal =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            _ = export_signal.recv() => {
                if let Err(e) = export_to_disk(&session).await {
                    tracing::error!(error = %e, "Export failed");
                }
            }
        }
    }

    feeder_cancel.cancel();
    let _ = feeder.await;
    session.stop().await;
    Ok(())
}

async fn export_to_disk(session: &ViewerSession) -> anyhow::Result<()> {
    let clip = session.export_clip().await?;
    tokio::fs::write(&clip.suggested_file_name, &clip.bytes).await?;
    tracing::info!(
        file = %clip.suggested_file_name,
        chunks = clip.chunk_count,
        duration_ms = clip.duration.as_millis() as u64,
        "Replay clip written",
    );

    // Best-effort fast-start remux; the IVF file above stays valid.
    match sightline_export::remux_faststart(&clip.bytes, clip.decoder_config.codec).await {
        Ok((bytes, container)) => {
            let name = clip
                .suggested_file_name
                .replace(".ivf", &format!(".{}", container.extension()));
            tokio::fs::write(&name, bytes).await?;
            tracing::info!(file = %name, "Fast-start remux written");
        }
        Err(e) => tracing::warn!(error = %e, "Fast-start remux unavailable"),
    }
    Ok(())
}

/// Publish a moving test pattern and advance the playback clock at the
/// capture cadence.
async fn feed_test_pattern(
    surface: Arc<SharedSurface>,
    clock: Arc<SharedClock>,
    fps: u32,
    cancel: CancellationToken,
) {
    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 360;

    let fps = fps.max(1);
    let mut ticker = tokio::time::interval(Duration::from_micros(1_000_000 / fps as u64));
    let mut index: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                surface.present(test_pattern(WIDTH, HEIGHT, index));
                clock.set_pts(index as i64 * CLOCK_RATE / fps as i64);
                index += 1;
            }
        }
    }
}

/// A vertical bar sweeping across a grey field.
fn test_pattern(width: u32, height: u32, index: u64) -> RasterFrame {
    let mut frame = RasterFrame::black(width, height);
    let bar_x = (index * 4 % width as u64) as u32;
    for y in 0..height {
        for x in 0..width {
            let offset = ((y * width + x) * 4) as usize;
            let value = if x >= bar_x && x < bar_x + 16 { 230 } else { 64 };
            frame.rgba[offset] = value;
            frame.rgba[offset + 1] = value;
            frame.rgba[offset + 2] = value;
        }
    }
    frame
}
