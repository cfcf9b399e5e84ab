//! Draws the active bounding-box set onto an RGBA raster.
//!
//! The renderer is stateless per tick: every call starts from a fully
//! transparent raster and redraws the whole set, so repeated calls with
//! the same inputs produce identical output and nothing accumulates.

use std::collections::HashMap;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use sightline_core::BoundingBox;

/// Outline thickness in pixels.
const OUTLINE_PX: i32 = 3;

/// Per-class outline colours with a default for unknown classes.
pub struct ClassPalette {
    colors: HashMap<String, Rgba<u8>>,
    default: Rgba<u8>,
}

impl Default for ClassPalette {
    fn default() -> Self {
        let mut colors = HashMap::new();
        colors.insert("person".into(), Rgba([255, 0, 0, 255]));
        colors.insert("car".into(), Rgba([0, 255, 0, 255]));
        colors.insert("truck".into(), Rgba([0, 0, 255, 255]));
        colors.insert("dog".into(), Rgba([255, 255, 0, 255]));
        colors.insert("cat".into(), Rgba([255, 0, 255, 255]));
        Self {
            colors,
            default: Rgba([255, 255, 0, 255]),
        }
    }
}

impl ClassPalette {
    /// Colour for a class label (case-insensitive).
    pub fn color(&self, class_label: &str) -> Rgba<u8> {
        self.colors
            .get(&class_label.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default)
    }
}

/// Rendering options.
pub struct OverlayStyle {
    /// Boxes with confidence below this are suppressed.
    pub min_confidence: f64,
    /// Font for label text. Without one, only the label tag background
    /// is drawn.
    pub font: Option<FontArc>,
    /// Label text size in pixels.
    pub label_px: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            font: None,
            label_px: 14.0,
        }
    }
}

/// Stateless bounding-box renderer.
pub struct OverlayRenderer {
    palette: ClassPalette,
    style: OverlayStyle,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            palette: ClassPalette::default(),
            style,
        }
    }

    /// Render the active set onto a fresh transparent raster of the
    /// displayed dimensions.
    ///
    /// Box corners are decoded from their linear offsets against the
    /// *original* raster width, then scaled by `(displayed/original)`
    /// per axis. Degenerate and sub-threshold boxes are skipped.
    pub fn render(
        &self,
        boxes: &[BoundingBox],
        original: (u32, u32),
        displayed: (u32, u32),
    ) -> RgbaImage {
        let (orig_w, orig_h) = original;
        let (disp_w, disp_h) = displayed;
        let mut canvas = RgbaImage::new(disp_w, disp_h);

        if orig_w == 0 || orig_h == 0 || disp_w == 0 || disp_h == 0 {
            return canvas;
        }

        let scale_x = disp_w as f64 / orig_w as f64;
        let scale_y = disp_h as f64 / orig_h as f64;

        for bbox in boxes {
            if bbox.confidence < self.style.min_confidence {
                continue;
            }
            let Some(((x1, y1), (x2, y2))) = bbox.corners(orig_w) else {
                continue;
            };
            let x1 = (x1 as f64 * scale_x).round() as i32;
            let y1 = (y1 as f64 * scale_y).round() as i32;
            let x2 = (x2 as f64 * scale_x).round() as i32;
            let y2 = (y2 as f64 * scale_y).round() as i32;
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            let color = self.palette.color(&bbox.class_label);
            self.draw_outline(&mut canvas, x1, y1, x2, y2, color);
            self.draw_label(&mut canvas, bbox, x1, y1, color);
        }

        canvas
    }

    /// Draw a 3 px hollow rectangle by nesting 1 px rectangles.
    fn draw_outline(&self, canvas: &mut RgbaImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgba<u8>) {
        for inset in 0..OUTLINE_PX {
            let w = (x2 - x1) - 2 * inset;
            let h = (y2 - y1) - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32),
                color,
            );
        }
    }

    /// Draw the `"{class} {confidence:.2}"` tag above the box.
    fn draw_label(&self, canvas: &mut RgbaImage, bbox: &BoundingBox, x1: i32, y1: i32, color: Rgba<u8>) {
        let label = format!("{} {:.2}", bbox.class_label, bbox.confidence);
        let scale = PxScale::from(self.style.label_px);

        let (text_w, text_h) = match &self.style.font {
            Some(font) => {
                let (w, h) = text_size(scale, font, &label);
                (w as i32, h as i32)
            }
            // Without a font, approximate the tag footprint.
            None => (
                (label.len() as f32 * self.style.label_px * 0.55) as i32,
                self.style.label_px as i32,
            ),
        };

        let tag_y = (y1 - text_h - 4).max(0);
        draw_filled_rect_mut(
            canvas,
            Rect::at(x1.max(0), tag_y).of_size((text_w + 8).max(1) as u32, (text_h + 4).max(1) as u32),
            color,
        );

        if let Some(font) = &self.style.font {
            draw_text_mut(
                canvas,
                Rgba([255, 255, 255, 255]),
                x1.max(0) + 4,
                tag_y + 2,
                scale,
                font,
                &label,
            );
        }
    }
}
