//! The encoder capability seam.
//!
//! Host-environment encode primitives differ wildly, so the pipeline
//! drives everything through the [`Encoder`] trait. The default
//! implementation is [`crate::ffmpeg::FfmpegEncoder`]; tests substitute
//! their own.

use async_trait::async_trait;

use sightline_core::RasterFrame;

use crate::chunk::{CodecId, DecoderConfig, EncodedChunk};

/// One encode profile from the preference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    pub codec: CodecId,
    /// Raster width the encoder is configured for.
    pub width: u32,
    /// Raster height the encoder is configured for.
    pub height: u32,
    /// Target frame rate of the capture cadence.
    pub fps: u32,
    /// Target bitrate in bits per second.
    pub bitrate_bps: u32,
}

impl EncoderProfile {
    /// Keyframe cadence in samples: one keyframe roughly every two
    /// seconds at the configured frame rate.
    pub fn keyframe_interval(&self) -> u64 {
        (2 * self.fps.max(1)) as u64
    }

    /// Nominal duration of one frame in microseconds.
    pub fn frame_interval_us(&self) -> i64 {
        1_000_000 / self.fps.max(1) as i64
    }
}

/// Errors produced by an encoder implementation.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// The requested profile cannot be satisfied; the pipeline tries
    /// the fallback profile exactly once.
    #[error("Encoder profile unsupported: {0}")]
    Unsupported(String),

    /// Failure while feeding or draining the codec.
    #[error("Encode error: {0}")]
    Codec(String),

    /// The encoder process or device went away.
    #[error("Encoder closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous encode capability.
///
/// `configure` must succeed before `submit`; `flush` is best-effort
/// and must leave the encoder usable; `close` releases the codec and
/// ends the chunk stream.
#[async_trait]
pub trait Encoder: Send {
    /// Configure (or reconfigure) the encoder for a profile.
    ///
    /// Reconfiguration tears down any previous codec state. Returns
    /// the decoder config that playback of the produced chunks needs.
    async fn configure(&mut self, profile: &EncoderProfile) -> Result<DecoderConfig, EncoderError>;

    /// Submit one composite frame for encoding.
    ///
    /// `timestamp_us` is pipeline-local and zero-based;
    /// `force_keyframe` requests a self-contained chunk. Returns the
    /// chunks the encoder has completed so far — possibly none, the
    /// codec may buffer.
    async fn submit(
        &mut self,
        frame: &RasterFrame,
        force_keyframe: bool,
        timestamp_us: i64,
    ) -> Result<Vec<EncodedChunk>, EncoderError>;

    /// Emit any buffered-but-unemitted chunks.
    async fn flush(&mut self) -> Result<Vec<EncodedChunk>, EncoderError>;

    /// Release the codec. Further calls return [`EncoderError::Closed`].
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyframe_interval_is_two_seconds_of_samples() {
        let profile = EncoderProfile {
            codec: CodecId::Vp9,
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_bps: 4_000_000,
        };
        assert_eq!(profile.keyframe_interval(), 60);
    }

    #[test]
    fn frame_interval_at_30fps() {
        let profile = EncoderProfile {
            codec: CodecId::Vp8,
            width: 640,
            height: 480,
            fps: 30,
            bitrate_bps: 1_000_000,
        };
        assert_eq!(profile.frame_interval_us(), 33_333);
    }

    #[test]
    fn zero_fps_does_not_divide_by_zero() {
        let profile = EncoderProfile {
            codec: CodecId::Vp8,
            width: 640,
            height: 480,
            fps: 0,
            bitrate_bps: 1_000_000,
        };
        assert_eq!(profile.keyframe_interval(), 2);
        assert_eq!(profile.frame_interval_us(), 1_000_000);
    }
}
