//! Collaborator seams consumed by the core.
//!
//! The video surface, its geometry, and the composite picture are owned
//! by the host application. The core only needs three narrow contracts,
//! expressed as traits so the capture pipeline and synchronizer can be
//! driven by anything that fulfils them (including test doubles).

use crate::types::Pts;

/// "Get current playback position" — sampled from the video surface
/// each render tick and each capture tick.
pub trait PlaybackClock: Send + Sync {
    /// Current presentation position in 90 kHz ticks, or `None` before
    /// the first frame has been presented.
    fn current_pts(&self) -> Option<Pts>;
}

/// Raster geometry of the video surface.
pub trait VideoGeometry: Send + Sync {
    /// Dimensions of the original (decoded) frame raster, or `None`
    /// until the first frame arrives.
    fn original_dimensions(&self) -> Option<(u32, u32)>;

    /// Dimensions of the on-screen raster after letterboxing.
    fn displayed_dimensions(&self) -> Option<(u32, u32)>;

    /// Top-left offset of the displayed raster within the window.
    fn displayed_offset(&self) -> (i32, i32) {
        (0, 0)
    }
}

/// An RGBA picture sampled from the display surface.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly-packed RGBA8, `width * height * 4` bytes, row-major.
    pub rgba: Vec<u8>,
}

impl RasterFrame {
    /// An all-black frame of the given dimensions.
    pub fn black(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; (width as usize) * (height as usize) * 4];
        // Opaque alpha.
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            rgba,
        }
    }
}

/// Supplies the current composite (video + overlay) picture to the
/// capture pipeline.
///
/// Implementations must be cheap to call at the capture frame rate and
/// must not share mutable frame state with the render tick — each call
/// returns an owned frame.
pub trait FrameSource: Send + Sync {
    /// The current composite frame, or `None` when no frame has been
    /// presented yet.
    fn capture(&self) -> Option<RasterFrame>;
}
