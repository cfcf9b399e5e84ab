//! Replay clip export.
//!
//! - [`assembler`] — snapshot → sorted, keyframe-aligned, re-based clip.
//! - [`muxer`] — the [`Muxer`] seam and the header-first IVF writer.
//! - [`remux`] — optional fast-start MP4/WebM repackaging via ffmpeg.

pub mod assembler;
pub mod muxer;
pub mod remux;

pub use assembler::{assemble_clip, ExportError, ExportedClip};
pub use muxer::{IvfMuxer, Muxer};
pub use remux::{remux_faststart, RemuxContainer, RemuxError};
