//! Session configuration loaded from environment variables.
//!
//! All fields have sensible defaults suitable for local development.
//! In production, override via environment variables.

use std::time::Duration;

use sightline_capture::CaptureConfig;
use sightline_core::{ticks_per_frame, SyncParams, VideoId};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Annotation backend WebSocket base URL.
    pub backend_ws_url: String,
    /// Stream the session is bound to.
    pub video_id: VideoId,
    /// Nominal frame rate of the source stream, used to derive the
    /// sync tolerance and retention window.
    pub source_fps: u32,
    /// How many source frames a batch stays active behind the playhead.
    pub retention_frames: u32,
    /// Maximum batches retained in the annotation buffer.
    pub annotation_capacity: usize,
    /// Boxes below this confidence are not drawn.
    pub min_confidence: f64,
    /// Trailing window of encoded video retained for replay export.
    pub replay_window: Duration,
    /// Capture/encode cadence.
    pub capture_fps: u32,
    /// Encoder target bitrate in bits per second.
    pub bitrate_bps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_ws_url: "ws://localhost:8702".into(),
            video_id: 1,
            source_fps: 30,
            retention_frames: 5,
            annotation_capacity: 500,
            min_confidence: 0.0,
            replay_window: Duration::from_secs(30),
            capture_fps: 30,
            bitrate_bps: 4_000_000,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                |
    /// |-------------------------------|------------------------|
    /// | `SIGHTLINE_BACKEND_WS_URL`    | `ws://localhost:8702`  |
    /// | `SIGHTLINE_VIDEO_ID`          | `1`                    |
    /// | `SIGHTLINE_SOURCE_FPS`        | `30`                   |
    /// | `SIGHTLINE_RETENTION_FRAMES`  | `5`                    |
    /// | `SIGHTLINE_ANNOTATION_CAP`    | `500`                  |
    /// | `SIGHTLINE_MIN_CONFIDENCE`    | `0.0`                  |
    /// | `SIGHTLINE_REPLAY_SECONDS`    | `30`                   |
    /// | `SIGHTLINE_CAPTURE_FPS`       | `30`                   |
    /// | `SIGHTLINE_BITRATE_BPS`       | `4000000`              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend_ws_url =
            std::env::var("SIGHTLINE_BACKEND_WS_URL").unwrap_or(defaults.backend_ws_url);

        let video_id: VideoId = std::env::var("SIGHTLINE_VIDEO_ID")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("SIGHTLINE_VIDEO_ID must be a valid integer id");

        let source_fps: u32 = std::env::var("SIGHTLINE_SOURCE_FPS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SIGHTLINE_SOURCE_FPS must be a valid u32");

        let retention_frames: u32 = std::env::var("SIGHTLINE_RETENTION_FRAMES")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SIGHTLINE_RETENTION_FRAMES must be a valid u32");

        let annotation_capacity: usize = std::env::var("SIGHTLINE_ANNOTATION_CAP")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("SIGHTLINE_ANNOTATION_CAP must be a valid usize");

        let min_confidence: f64 = std::env::var("SIGHTLINE_MIN_CONFIDENCE")
            .unwrap_or_else(|_| "0.0".into())
            .parse()
            .expect("SIGHTLINE_MIN_CONFIDENCE must be a valid f64");

        let replay_seconds: u64 = std::env::var("SIGHTLINE_REPLAY_SECONDS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SIGHTLINE_REPLAY_SECONDS must be a valid u64");

        let capture_fps: u32 = std::env::var("SIGHTLINE_CAPTURE_FPS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SIGHTLINE_CAPTURE_FPS must be a valid u32");

        let bitrate_bps: u32 = std::env::var("SIGHTLINE_BITRATE_BPS")
            .unwrap_or_else(|_| "4000000".into())
            .parse()
            .expect("SIGHTLINE_BITRATE_BPS must be a valid u32");

        Self {
            backend_ws_url,
            video_id,
            source_fps,
            retention_frames,
            annotation_capacity,
            min_confidence,
            replay_window: Duration::from_secs(replay_seconds),
            capture_fps,
            bitrate_bps,
        }
    }

    /// Synchronizer parameters derived from the source frame rate.
    pub fn sync_params(&self) -> SyncParams {
        SyncParams {
            ticks_per_frame: ticks_per_frame(self.source_fps),
            retention_frames: self.retention_frames,
        }
    }

    /// Capture pipeline settings derived from this config.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            fps: self.capture_fps,
            bitrate_bps: self.bitrate_bps,
            window: self.replay_window,
            ..CaptureConfig::default()
        }
    }
}
