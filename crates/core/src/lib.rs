//! Core types and the playback synchronizer.
//!
//! This crate holds everything the other sightline crates agree on:
//!
//! - [`types`] — the 90 kHz presentation-timestamp clock and frame-rate
//!   conversions.
//! - [`annotation`] — bounding boxes, annotation batches, and the
//!   capacity-bounded [`AnnotationBuffer`].
//! - [`sync`] — the pure active-set computation that correlates the
//!   annotation buffer against the playback clock each render tick.
//! - [`collab`] — traits for the collaborators the core consumes
//!   (playback position, raster geometry, composite frame sampling).

pub mod annotation;
pub mod collab;
pub mod sync;
pub mod types;

pub use annotation::{AnnotationBatch, AnnotationBuffer, AnnotationSnapshot, BoundingBox};
pub use collab::{FrameSource, PlaybackClock, RasterFrame, VideoGeometry};
pub use sync::{active_boxes, SyncParams};
pub use types::{ticks_per_frame, Pts, VideoId, CLOCK_RATE};
