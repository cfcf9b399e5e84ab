//! Ffmpeg-backed encoder.
//!
//! Spawns an `ffmpeg` child process that reads raw RGBA frames on
//! stdin and emits an IVF bitstream (VP9 or VP8) on stdout. IVF frame
//! headers carry the payload size and a frame-index timestamp, which
//! makes the output trivially splittable into [`EncodedChunk`]s; the
//! keyframe flag is recovered from the first payload byte(s).
//!
//! Keyframe cadence is enforced by the encoder's GOP setting
//! (`-g 2×fps`), so the per-submit `force_keyframe` request is
//! satisfied by configuration rather than per-frame control.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::mpsc;

use sightline_core::RasterFrame;

use crate::chunk::{CodecId, DecoderConfig, EncodedChunk};
use crate::encoder::{Encoder, EncoderError, EncoderProfile};

/// Length of the IVF file header.
const IVF_FILE_HEADER_LEN: usize = 32;
/// Length of each IVF frame header.
const IVF_FRAME_HEADER_LEN: usize = 12;

/// Encoder implementation backed by an ffmpeg child process.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunk_rx: Option<mpsc::UnboundedReceiver<EncodedChunk>>,
    reader: Option<tokio::task::JoinHandle<()>>,
    profile: Option<EncoderProfile>,
    config: Option<DecoderConfig>,
    /// Set once the config has been attached to an emitted chunk.
    config_attached: bool,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            child: None,
            stdin: None,
            chunk_rx: None,
            reader: None,
            profile: None,
            config: None,
            config_attached: false,
        }
    }

    /// Check whether ffmpeg exists and lists the given encoder.
    async fn encoder_available(name: &str) -> Result<bool, EncoderError> {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::Unsupported("ffmpeg binary not found".into())
                } else {
                    EncoderError::Io(e)
                }
            })?;
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(listing.lines().any(|line| {
            line.split_whitespace().nth(1) == Some(name)
        }))
    }

    /// Kill any running child and drop its plumbing.
    async fn teardown(&mut self) {
        self.stdin.take();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        self.chunk_rx.take();
        self.config_attached = false;
    }

    /// Drain every chunk the reader task has parsed so far.
    fn drain_available(&mut self) -> Vec<EncodedChunk> {
        let mut chunks = Vec::new();
        if let Some(rx) = self.chunk_rx.as_mut() {
            while let Ok(chunk) = rx.try_recv() {
                chunks.push(chunk);
            }
        }
        // The first emitted chunk carries the decoder config so an
        // exported clip can resolve one even after ring eviction.
        if !self.config_attached {
            if let (Some(first), Some(config)) = (chunks.first_mut(), self.config.as_ref()) {
                first.decoder_config = Some(config.clone());
                self.config_attached = true;
            }
        }
        chunks
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn configure(&mut self, profile: &EncoderProfile) -> Result<DecoderConfig, EncoderError> {
        self.teardown().await;

        let encoder_name = profile.codec.ffmpeg_encoder();
        if !Self::encoder_available(encoder_name).await? {
            return Err(EncoderError::Unsupported(format!(
                "ffmpeg has no {encoder_name} encoder"
            )));
        }

        let video_size = format!("{}x{}", profile.width, profile.height);
        let framerate = profile.fps.max(1).to_string();
        let bitrate = profile.bitrate_bps.to_string();
        let gop = profile.keyframe_interval().to_string();
        let mut child = tokio::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-video_size", video_size.as_str()])
            .args(["-framerate", framerate.as_str()])
            .args(["-i", "pipe:0"])
            .args(["-c:v", encoder_name])
            .args(["-b:v", bitrate.as_str()])
            .args(["-g", gop.as_str()])
            .args(["-deadline", "realtime", "-cpu-used", "8"])
            .args(["-f", "ivf", "pipe:1"])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::Unsupported("ffmpeg binary not found".into())
                } else {
                    EncoderError::Io(e)
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Codec("ffmpeg stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncoderError::Codec("ffmpeg stdout unavailable".into()))?;

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let codec = profile.codec;
        let frame_interval_us = profile.frame_interval_us();
        let reader = tokio::spawn(async move {
            if let Err(e) = read_ivf_stream(stdout, codec, frame_interval_us, chunk_tx).await {
                tracing::warn!(error = %e, "IVF reader stopped");
            }
        });

        let config = DecoderConfig {
            codec: profile.codec,
            width: profile.width,
            height: profile.height,
        };

        tracing::info!(
            codec = encoder_name,
            width = profile.width,
            height = profile.height,
            fps = profile.fps,
            gop = %gop,
            "Ffmpeg encoder configured",
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunk_rx = Some(chunk_rx);
        self.reader = Some(reader);
        self.profile = Some(profile.clone());
        self.config = Some(config.clone());
        Ok(config)
    }

    /// Feed one frame. Timestamps on the returned chunks come from the
    /// IVF frame index at the configured rate, which is the same
    /// zero-based microsecond clock the pipeline submits with.
    async fn submit(
        &mut self,
        frame: &RasterFrame,
        _force_keyframe: bool,
        _timestamp_us: i64,
    ) -> Result<Vec<EncodedChunk>, EncoderError> {
        let profile = self.profile.as_ref().ok_or(EncoderError::Closed)?;
        if (frame.width, frame.height) != (profile.width, profile.height) {
            return Err(EncoderError::Codec(format!(
                "frame is {}x{}, encoder configured for {}x{}",
                frame.width, frame.height, profile.width, profile.height
            )));
        }

        let stdin = self.stdin.as_mut().ok_or(EncoderError::Closed)?;
        stdin
            .write_all(&frame.rgba)
            .await
            .map_err(|e| EncoderError::Codec(format!("ffmpeg stdin write failed: {e}")))?;

        Ok(self.drain_available())
    }

    /// Best-effort flush: returns whatever the child has already
    /// emitted. A realtime libvpx encoder produces one packet per
    /// input frame, so there is nothing meaningfully buffered beyond
    /// pipe latency; the terminal drain happens in [`close`](Encoder::close).
    async fn flush(&mut self) -> Result<Vec<EncodedChunk>, EncoderError> {
        if self.stdin.is_none() {
            return Err(EncoderError::Closed);
        }
        // Give the pipe a moment to deliver packets for frames already
        // submitted.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(self.drain_available())
    }

    async fn close(&mut self) {
        // Closing stdin ends the stream and lets ffmpeg exit cleanly.
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await;
            let _ = child.kill().await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(1), reader).await;
        }
        self.chunk_rx.take();
        self.profile.take();
    }
}

/// Parse the IVF byte stream from ffmpeg into encoded chunks.
async fn read_ivf_stream(
    mut stdout: ChildStdout,
    codec: CodecId,
    frame_interval_us: i64,
    chunk_tx: mpsc::UnboundedSender<EncodedChunk>,
) -> Result<(), String> {
    let mut file_header = [0u8; IVF_FILE_HEADER_LEN];
    stdout
        .read_exact(&mut file_header)
        .await
        .map_err(|e| format!("short IVF file header: {e}"))?;
    validate_ivf_header(&file_header)?;

    loop {
        let mut frame_header = [0u8; IVF_FRAME_HEADER_LEN];
        match stdout.read_exact(&mut frame_header).await {
            Ok(_) => {}
            // Normal end of stream between frames.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(format!("IVF frame header read failed: {e}")),
        }
        let (size, pts) = parse_frame_header(&frame_header);

        let mut payload = vec![0u8; size as usize];
        stdout
            .read_exact(&mut payload)
            .await
            .map_err(|e| format!("IVF frame payload read failed: {e}"))?;

        let chunk = EncodedChunk {
            timestamp_us: pts as i64 * frame_interval_us,
            duration_us: None,
            is_keyframe: payload_is_keyframe(codec, &payload),
            payload: Bytes::from(payload),
            decoder_config: None,
        };
        if chunk_tx.send(chunk).is_err() {
            // Receiver dropped; the encoder is being torn down.
            return Ok(());
        }
    }
}

/// Validate the 32-byte IVF file header ffmpeg writes before the first
/// frame.
fn validate_ivf_header(header: &[u8; IVF_FILE_HEADER_LEN]) -> Result<(), String> {
    if &header[0..4] != b"DKIF" {
        return Err("missing DKIF magic".into());
    }
    Ok(())
}

/// Split a 12-byte IVF frame header into (payload size, pts).
fn parse_frame_header(header: &[u8; IVF_FRAME_HEADER_LEN]) -> (u32, u64) {
    let size = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let pts = u64::from_le_bytes([
        header[4], header[5], header[6], header[7], header[8], header[9], header[10], header[11],
    ]);
    (size, pts)
}

/// Recover the keyframe flag from the first payload byte.
///
/// VP8: bit 0 of the first byte is the inverse key-frame flag.
/// VP9 (profile 0, as produced by our profiles): the uncompressed
/// header reads MSB-first as frame_marker(2) profile(2)
/// show_existing_frame(1) frame_type(1), with frame_type 0 for key
/// frames.
fn payload_is_keyframe(codec: CodecId, payload: &[u8]) -> bool {
    let Some(&first) = payload.first() else {
        return false;
    };
    match codec {
        CodecId::Vp8 => first & 0x01 == 0,
        CodecId::Vp9 => first & 0x04 == 0,
    }
}
