//! Headless collaborator implementations.
//!
//! A real host wires the session to its decoder clock and display
//! surface. These shared stand-ins cover embedding, the demo binary,
//! and tests: the host (or feeder task) publishes, the session's
//! render and capture paths read.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use sightline_core::{FrameSource, PlaybackClock, Pts, RasterFrame, VideoGeometry};

/// Playback position published by whatever drives decoding.
#[derive(Default)]
pub struct SharedClock {
    /// Current position in 90 kHz ticks; negative means "no frame
    /// presented yet".
    pts: AtomicI64,
}

impl SharedClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pts: AtomicI64::new(-1),
        })
    }

    pub fn set_pts(&self, pts: Pts) {
        self.pts.store(pts, Ordering::Release);
    }
}

impl PlaybackClock for SharedClock {
    fn current_pts(&self) -> Option<Pts> {
        let pts = self.pts.load(Ordering::Acquire);
        (pts >= 0).then_some(pts)
    }
}

/// Composite picture published by the host each render tick.
#[derive(Default)]
pub struct SharedSurface {
    frame: Mutex<Option<RasterFrame>>,
}

impl SharedSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the current composite picture.
    pub fn present(&self, frame: RasterFrame) {
        *self.frame.lock().expect("surface poisoned") = Some(frame);
    }
}

impl FrameSource for SharedSurface {
    fn capture(&self) -> Option<RasterFrame> {
        self.frame.lock().expect("surface poisoned").clone()
    }
}

impl VideoGeometry for SharedSurface {
    fn original_dimensions(&self) -> Option<(u32, u32)> {
        self.frame
            .lock()
            .expect("surface poisoned")
            .as_ref()
            .map(|f| (f.width, f.height))
    }

    fn displayed_dimensions(&self) -> Option<(u32, u32)> {
        self.original_dimensions()
    }
}
