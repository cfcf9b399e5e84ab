//! Bounding-box overlay renderer and video/overlay compositor.
//!
//! [`OverlayRenderer`] draws the active box set onto a transparent RGBA
//! raster scaled to the on-screen geometry; [`compose`] blends that
//! raster over the current video frame to produce the composite picture
//! the capture pipeline encodes.

pub mod compose;
pub mod renderer;

pub use compose::{compose, composite_frame};
pub use renderer::{ClassPalette, OverlayRenderer, OverlayStyle};
