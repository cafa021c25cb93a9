//! Overlay drawing for processed frames.
//!
//! Boxes arrive in normalized coordinates and are denormalized against the
//! frame size. Coordinates that land (through rounding) slightly outside the
//! frame are clamped instead of rejected.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use tracing::debug;

use crate::error::{RekognitionError, Result};
use crate::geometry::{BoundingBox, Point, Roi};

/// Outline color of the configured region of interest.
pub const ROI_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline color of matched faces and qualifying objects.
pub const MATCH_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws boxes, center markers and optional text labels onto frames.
///
/// Text is only rendered when a font has been loaded; without one the
/// annotator still draws every outline and marker.
#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TrueType/OpenType font used for box labels.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RekognitionError::Config(format!("failed to read font {}: {e}", path.display()))
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| {
            RekognitionError::Config(format!("invalid font {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded label font");
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a rectangle outline for `bbox`, a dot at its center and, when a
    /// font is available, `label` just above the box.
    pub fn draw_box(
        &self,
        image: &mut RgbImage,
        bbox: &BoundingBox,
        color: Rgb<u8>,
        label: Option<&str>,
    ) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        let x1 = to_pixel(bbox.left, w);
        let y1 = to_pixel(bbox.top, h);
        let x2 = to_pixel(bbox.right(), w);
        let y2 = to_pixel(bbox.bottom(), h);

        let thickness = line_thickness(w, h);
        for inset in 0..thickness {
            let left = x1 + inset;
            let top = y1 + inset;
            let width = (x2 - inset) - left + 1;
            let height = (y2 - inset) - top + 1;
            if width < 1 || height < 1 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(left, top).of_size(width as u32, height as u32),
                color,
            );
        }

        let center = bbox.center();
        let radius = (thickness * 2).max(2);
        draw_filled_circle_mut(image, (to_pixel(center.x, w), to_pixel(center.y, h)), radius, color);

        if let (Some(font), Some(text)) = (self.font.as_ref(), label) {
            let scale = PxScale::from((h as f32 / 30.0).clamp(12.0, 48.0));
            let (_, text_h) = text_size(scale, font, text);
            let text_y = (y1 - text_h as i32 - thickness).max(0);
            draw_text_mut(image, LABEL_COLOR, x1, text_y, scale, font, text);
            draw_text_mut(image, color, x1 + 1, text_y + 1, scale, font, text);
        }
    }

    /// Draw the outline of a region of interest.
    pub fn draw_roi(&self, image: &mut RgbImage, roi: &Roi) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        let vertices = roi.vertices();
        let thickness = line_thickness(w, h);
        for (i, start) in vertices.iter().enumerate() {
            let end = vertices[(i + 1) % vertices.len()];
            for offset in 0..thickness {
                let shift = offset as f32;
                draw_line_segment_mut(
                    image,
                    shifted(*start, w, h, shift),
                    shifted(end, w, h, shift),
                    ROI_COLOR,
                );
            }
        }
    }
}

/// Convert a normalized coordinate into a pixel index inside `[0, extent - 1]`.
fn to_pixel(value: f32, extent: u32) -> i32 {
    let max = extent.saturating_sub(1) as f32;
    let value = if value.is_finite() { value } else { 0.0 };
    (value * extent as f32).clamp(0.0, max).round() as i32
}

fn shifted(point: Point, w: u32, h: u32, shift: f32) -> (f32, f32) {
    let x = (to_pixel(point.x, w) as f32 + shift).min(w.saturating_sub(1) as f32);
    let y = (to_pixel(point.y, h) as f32 + shift).min(h.saturating_sub(1) as f32);
    (x, y)
}

fn line_thickness(w: u32, h: u32) -> i32 {
    (w.min(h) / 200).max(1) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([0, 0, 0]))
    }

    #[test]
    fn test_to_pixel_clamps() {
        assert_eq!(to_pixel(0.0, 100), 0);
        assert_eq!(to_pixel(1.0, 100), 99);
        assert_eq!(to_pixel(1.000_001, 100), 99);
        assert_eq!(to_pixel(-0.000_001, 100), 0);
        assert_eq!(to_pixel(f32::NAN, 100), 0);
    }

    #[test]
    fn test_draw_box_outline_and_center() {
        let mut image = blank(100, 100);
        let bbox = BoundingBox::new(0.2, 0.2, 0.6, 0.6);
        Annotator::new().draw_box(&mut image, &bbox, MATCH_COLOR, Some("person1: 98.4%"));

        // Top-left corner of the outline.
        assert_eq!(*image.get_pixel(20, 20), MATCH_COLOR);
        // Center marker.
        assert_eq!(*image.get_pixel(50, 50), MATCH_COLOR);
        // Between outline and marker stays untouched.
        assert_eq!(*image.get_pixel(35, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_caption_needs_a_font() {
        let bbox = BoundingBox::new(0.2, 0.4, 0.6, 0.4);
        let mut captioned = blank(100, 100);
        let mut plain = blank(100, 100);
        let annotator = Annotator::new();
        assert!(!annotator.has_font());

        annotator.draw_box(&mut captioned, &bbox, MATCH_COLOR, Some("person1: 98.4%"));
        annotator.draw_box(&mut plain, &bbox, MATCH_COLOR, None);
        assert_eq!(captioned, plain);
    }

    #[test]
    fn test_draw_box_slightly_out_of_bounds_does_not_panic() {
        let mut image = blank(64, 48);
        let bbox = BoundingBox::new(-0.000_01, -0.000_01, 1.000_02, 1.000_02);
        Annotator::new().draw_box(&mut image, &bbox, MATCH_COLOR, None);
        assert_eq!(*image.get_pixel(0, 0), MATCH_COLOR);
        assert_eq!(*image.get_pixel(63, 47), MATCH_COLOR);
    }

    #[test]
    fn test_draw_box_degenerate_box() {
        let mut image = blank(10, 10);
        let bbox = BoundingBox::new(0.5, 0.5, 0.0, 0.0);
        Annotator::new().draw_box(&mut image, &bbox, MATCH_COLOR, None);
        assert_eq!(*image.get_pixel(5, 5), MATCH_COLOR);
    }

    #[test]
    fn test_draw_roi_uses_roi_color() {
        let mut image = blank(100, 100);
        let roi = Roi::Rect {
            x_min: 0.1,
            y_min: 0.1,
            x_max: 0.9,
            y_max: 0.9,
        };
        Annotator::new().draw_roi(&mut image, &roi);
        assert_eq!(*image.get_pixel(50, 10), ROI_COLOR);
        assert_eq!(*image.get_pixel(10, 50), ROI_COLOR);
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_file_is_config_error() {
        let err = Annotator::with_font_file(Path::new("/nonexistent/font.ttf"))
            .err()
            .unwrap();
        assert!(matches!(err, RekognitionError::Config(_)));
    }
}
