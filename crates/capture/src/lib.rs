//! Rolling capture/encode pipeline.
//!
//! Continuously re-encodes the composited picture into a bounded
//! trailing window of compressed chunks:
//!
//! - [`chunk`] — encoded chunks, decoder configs, and the time-bounded
//!   [`ChunkRingBuffer`].
//! - [`encoder`] — the codec capability seam ([`Encoder`]) and profile
//!   types.
//! - [`ffmpeg`] — the default encoder, an ffmpeg child process
//!   producing an IVF bitstream.
//! - [`pipeline`] — the `Idle → Configuring → Encoding → Flushing`
//!   state machine and its background-safe cadence driver.

pub mod chunk;
pub mod encoder;
pub mod ffmpeg;
pub mod pipeline;

pub use chunk::{ChunkRingBuffer, CodecId, DecoderConfig, EncodedChunk};
pub use encoder::{Encoder, EncoderError, EncoderProfile};
pub use ffmpeg::FfmpegEncoder;
pub use pipeline::{CaptureConfig, CapturePipeline, CaptureSnapshot, PipelineError, PipelineHandle};
