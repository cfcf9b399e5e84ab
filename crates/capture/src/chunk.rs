//! Encoded chunks and the time-bounded ring buffer.
//!
//! The ring buffer holds the trailing `W` seconds of encoded output,
//! evicting whole chunks from the old end on every insertion. The most
//! recent decoder config is cached independently so it survives the
//! eviction of the chunk that introduced it.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

/// Video codec of an encode profile / decoder config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Vp9,
    Vp8,
}

impl CodecId {
    /// IVF fourcc for this codec.
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            CodecId::Vp9 => *b"VP90",
            CodecId::Vp8 => *b"VP80",
        }
    }

    /// Name of the ffmpeg encoder implementing this codec.
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            CodecId::Vp9 => "libvpx-vp9",
            CodecId::Vp8 => "libvpx",
        }
    }
}

/// Codec initialisation data required to interpret subsequent chunks.
///
/// Exactly one config must be resolvable for any chunk used to start
/// playback of an exported clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub codec: CodecId,
    /// Original raster width in pixels.
    pub width: u32,
    /// Original raster height in pixels.
    pub height: u32,
}

/// One compressed frame produced by the encoder. Immutable.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Pipeline-local presentation time in microseconds, zero-based at
    /// pipeline start.
    pub timestamp_us: i64,
    /// Chunk duration; `None` when the encoder does not report one
    /// (the export assembler falls back to the nominal frame interval).
    pub duration_us: Option<i64>,
    /// Whether this chunk is self-contained (a clip must start on one).
    pub is_keyframe: bool,
    /// Compressed bitstream payload.
    pub payload: Bytes,
    /// Decoder config introduced by this chunk, if any.
    pub decoder_config: Option<DecoderConfig>,
}

/// Time-bounded buffer of encoded chunks ordered by timestamp.
///
/// Invariant, re-established after every insertion:
/// `latest.timestamp - oldest.timestamp <= window`.
pub struct ChunkRingBuffer {
    chunks: VecDeque<EncodedChunk>,
    window_us: i64,
    cached_config: Option<DecoderConfig>,
}

impl ChunkRingBuffer {
    /// Create a buffer retaining a trailing window of `window` seconds.
    pub fn new(window: Duration) -> Self {
        Self {
            chunks: VecDeque::new(),
            window_us: window.as_micros() as i64,
            cached_config: None,
        }
    }

    /// Append a chunk and evict everything older than the window
    /// relative to the newest timestamp.
    ///
    /// The pipeline task is the only caller.
    pub fn push(&mut self, chunk: EncodedChunk) {
        if let Some(config) = &chunk.decoder_config {
            self.cached_config = Some(config.clone());
        }
        self.chunks.push_back(chunk);

        let newest = self
            .chunks
            .back()
            .map(|c| c.timestamp_us)
            .unwrap_or_default();
        while let Some(front) = self.chunks.front() {
            if newest - front.timestamp_us > self.window_us {
                self.chunks.pop_front();
            } else {
                break;
            }
        }
    }

    /// The most recent decoder config seen, regardless of whether its
    /// chunk is still retained.
    pub fn cached_config(&self) -> Option<&DecoderConfig> {
        self.cached_config.as_ref()
    }

    /// Immutable copy of the retained chunks, oldest first.
    ///
    /// Chunk payloads are reference-counted, so this is cheap.
    pub fn snapshot(&self) -> Vec<EncodedChunk> {
        self.chunks.iter().cloned().collect()
    }

    /// Time spanned between the oldest and newest retained chunk.
    pub fn span(&self) -> Duration {
        match (self.chunks.front(), self.chunks.back()) {
            (Some(first), Some(last)) => {
                Duration::from_micros((last.timestamp_us - first.timestamp_us).max(0) as u64)
            }
            _ => Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
