//! Video/overlay compositing for the capture path.
//!
//! The capture pipeline encodes the picture the operator sees: the
//! video frame with the overlay baked in. Compositing always happens at
//! the *original* raster dimensions so the exported clip matches the
//! source geometry, not the on-screen letterboxed size.

use image::{imageops, RgbaImage};

use sightline_core::{BoundingBox, RasterFrame};

use crate::renderer::OverlayRenderer;

/// Alpha-blend an overlay raster over a video frame.
///
/// Both rasters must share dimensions; mismatches return the video
/// frame untouched (the overlay is advisory, the video is not).
pub fn compose(video: &RasterFrame, overlay: &RgbaImage) -> RasterFrame {
    if overlay.dimensions() != (video.width, video.height) {
        tracing::warn!(
            video_w = video.width,
            video_h = video.height,
            overlay_w = overlay.width(),
            overlay_h = overlay.height(),
            "Overlay dimensions mismatch; capturing video only",
        );
        return video.clone();
    }

    let mut base = match RgbaImage::from_raw(video.width, video.height, video.rgba.clone()) {
        Some(img) => img,
        None => return video.clone(),
    };
    imageops::overlay(&mut base, overlay, 0, 0);

    RasterFrame {
        width: video.width,
        height: video.height,
        rgba: base.into_raw(),
    }
}

/// Render the active box set at the video frame's own dimensions and
/// bake it in.
pub fn composite_frame(
    renderer: &OverlayRenderer,
    video: &RasterFrame,
    boxes: &[BoundingBox],
) -> RasterFrame {
    let dims = (video.width, video.height);
    let overlay = renderer.render(boxes, dims, dims);
    compose(video, &overlay)
}
