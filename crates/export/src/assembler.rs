//! Replay clip assembly.
//!
//! Turns a capture snapshot into a playable clip: sort, cut at the
//! first keyframe, resolve the decoder config, re-base timestamps to
//! zero, and mux. Works entirely on the snapshot; the live ring buffer
//! is never touched.

use std::time::Duration;

use bytes::Bytes;

use sightline_capture::{CaptureSnapshot, DecoderConfig, EncodedChunk};
use sightline_core::VideoId;

use crate::muxer::{IvfMuxer, Muxer};

/// Export failures. These are the only errors surfaced to the user;
/// everything upstream degrades silently into the snapshot contents.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// No retained chunk is a keyframe, so no playable clip can start.
    #[error("No keyframe in the capture window, nothing to export")]
    NoKeyframe,

    /// No decoder config is resolvable for the first chunk.
    #[error("No decoder configuration available for the clip")]
    NoDecoderConfig,

    /// Container remux failed (the IVF artifact is still valid).
    #[error("Remux failed: {0}")]
    Remux(#[from] crate::remux::RemuxError),
}

/// A finished clip ready to hand to the user.
#[derive(Debug, Clone)]
pub struct ExportedClip {
    /// IVF container bytes, header first.
    pub bytes: Bytes,
    /// `replay_video{id}_{secs}s_{unix_ts}.ivf`
    pub suggested_file_name: String,
    pub decoder_config: DecoderConfig,
    pub duration: Duration,
    pub chunk_count: usize,
}

/// Assemble the replay clip for `video_id` from a pipeline snapshot.
pub fn assemble_clip(
    snapshot: &CaptureSnapshot,
    video_id: VideoId,
) -> Result<ExportedClip, ExportError> {
    let mut chunks = snapshot.chunks.clone();
    // Idempotent on already-sorted input.
    chunks.sort_by_key(|c| c.timestamp_us);

    let cut = chunks
        .iter()
        .position(|c| c.is_keyframe)
        .ok_or(ExportError::NoKeyframe)?;
    let clip = &chunks[cut..];

    let config = clip[0]
        .decoder_config
        .clone()
        .or_else(|| snapshot.decoder_config.clone())
        .ok_or(ExportError::NoDecoderConfig)?;

    let nominal_interval_us = 1_000_000 / snapshot.fps.max(1) as i64;
    let t0 = clip[0].timestamp_us;

    let mut muxer = IvfMuxer::new(&config);
    let mut end_us = 0i64;
    for chunk in clip {
        let rebased = EncodedChunk {
            timestamp_us: chunk.timestamp_us - t0,
            duration_us: Some(chunk.duration_us.unwrap_or(nominal_interval_us)),
            is_keyframe: chunk.is_keyframe,
            payload: chunk.payload.clone(),
            decoder_config: None,
        };
        end_us = rebased.timestamp_us + rebased.duration_us.unwrap_or(0);
        muxer.add_chunk(&rebased);
    }
    let duration = Duration::from_micros(end_us.max(0) as u64);

    let clip_len = clip.len();
    tracing::info!(
        video_id,
        chunks = clip_len,
        dropped = cut,
        duration_ms = duration.as_millis() as u64,
        "Replay clip assembled",
    );

    Ok(ExportedClip {
        bytes: muxer.finalize(),
        suggested_file_name: suggested_file_name(video_id, duration),
        decoder_config: config,
        duration,
        chunk_count: clip_len,
    })
}

fn suggested_file_name(video_id: VideoId, duration: Duration) -> String {
    format!(
        "replay_video{}_{}s_{}.ivf",
        video_id,
        duration.as_secs(),
        chrono::Utc::now().timestamp()
    )
}
