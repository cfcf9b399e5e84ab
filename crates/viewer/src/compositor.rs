//! Frame source adapter that bakes the overlay into captured frames.
//!
//! The capture pipeline must encode the picture the operator sees, not
//! the bare video. [`CompositingFrameSource`] wraps the host's frame
//! source: every capture samples the playback clock, computes the
//! active box set from the annotation buffer, and composites it onto
//! the frame at the frame's own (original) dimensions. The buffer is
//! only ever read; snapshots keep the channel writer unblocked.

use std::sync::Arc;

use sightline_core::{
    active_boxes, AnnotationBuffer, FrameSource, PlaybackClock, RasterFrame, SyncParams,
};
use sightline_overlay::{composite_frame, OverlayRenderer};

pub struct CompositingFrameSource {
    video: Arc<dyn FrameSource>,
    clock: Arc<dyn PlaybackClock>,
    buffer: Arc<AnnotationBuffer>,
    renderer: Arc<OverlayRenderer>,
    params: SyncParams,
}

impl CompositingFrameSource {
    pub fn new(
        video: Arc<dyn FrameSource>,
        clock: Arc<dyn PlaybackClock>,
        buffer: Arc<AnnotationBuffer>,
        renderer: Arc<OverlayRenderer>,
        params: SyncParams,
    ) -> Self {
        Self {
            video,
            clock,
            buffer,
            renderer,
            params,
        }
    }
}

impl FrameSource for CompositingFrameSource {
    fn capture(&self) -> Option<RasterFrame> {
        let frame = self.video.capture()?;

        // No presented frame yet means no meaningful playhead to match
        // annotations against.
        let Some(current_pts) = self.clock.current_pts() else {
            return Some(frame);
        };
        let boxes = active_boxes(&self.buffer.snapshot(), current_pts, &self.params);
        if boxes.is_empty() {
            return Some(frame);
        }
        Some(composite_frame(&self.renderer, &frame, &boxes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sightline_core::{AnnotationBatch, BoundingBox};
    use sightline_overlay::OverlayStyle;

    use crate::surface::{SharedClock, SharedSurface};

    const WIDTH: u32 = 100;

    fn params() -> SyncParams {
        SyncParams {
            ticks_per_frame: 3_000,
            retention_frames: 5,
        }
    }

    fn grey_surface() -> Arc<SharedSurface> {
        let surface = SharedSurface::new();
        let mut frame = RasterFrame::black(WIDTH, WIDTH);
        for px in frame.rgba.chunks_exact_mut(4) {
            px[0] = 100;
            px[1] = 100;
            px[2] = 100;
        }
        surface.present(frame);
        surface
    }

    fn batch(pts: i64) -> AnnotationBatch {
        AnnotationBatch {
            pts,
            boxes: vec![BoundingBox {
                top_left_offset: 10 * WIDTH as i64 + 10,
                bottom_right_offset: 50 * WIDTH as i64 + 50,
                class_label: "person".into(),
                confidence: 0.9,
            }],
            stream_start_time_ms: 0,
            received_at: Utc::now(),
        }
    }

    fn source(
        surface: Arc<SharedSurface>,
        clock: Arc<SharedClock>,
        buffer: Arc<AnnotationBuffer>,
    ) -> CompositingFrameSource {
        CompositingFrameSource::new(
            surface,
            clock,
            buffer,
            Arc::new(OverlayRenderer::new(OverlayStyle::default())),
            params(),
        )
    }

    #[test]
    fn active_boxes_are_baked_into_captured_frames() {
        let surface = grey_surface();
        let raw = surface.capture().unwrap();

        let clock = SharedClock::new();
        clock.set_pts(90_000);
        let buffer = Arc::new(AnnotationBuffer::default());
        buffer.push(batch(90_000));

        let frame = source(surface, clock, buffer).capture().unwrap();
        assert_ne!(frame.rgba, raw.rgba);
        // Outline pixel carries the person color, not the grey video.
        let idx = (10 * WIDTH as usize + 10) * 4;
        assert_eq!(&frame.rgba[idx..idx + 3], &[255, 0, 0]);
    }

    #[test]
    fn no_playhead_passes_the_frame_through() {
        let surface = grey_surface();
        let raw = surface.capture().unwrap();

        let buffer = Arc::new(AnnotationBuffer::default());
        buffer.push(batch(90_000));

        let frame = source(surface, SharedClock::new(), buffer)
            .capture()
            .unwrap();
        assert_eq!(frame.rgba, raw.rgba);
    }

    #[test]
    fn out_of_window_batches_do_not_mark_the_frame() {
        let surface = grey_surface();
        let raw = surface.capture().unwrap();

        let clock = SharedClock::new();
        clock.set_pts(90_000);
        let buffer = Arc::new(AnnotationBuffer::default());
        // Far behind the retention window at the current playhead.
        buffer.push(batch(30_000));

        let frame = source(surface, clock, buffer).capture().unwrap();
        assert_eq!(frame.rgba, raw.rgba);
    }

    #[test]
    fn empty_surface_captures_nothing() {
        let buffer = Arc::new(AnnotationBuffer::default());
        let adapter = source(SharedSurface::new(), SharedClock::new(), buffer);
        assert!(adapter.capture().is_none());
    }
}
