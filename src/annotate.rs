//! Box and label rendering onto RGB frames.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: i32 = 2;
const LABEL_HEIGHT: f32 = 16.0;
const LABEL_OFFSET: i32 = 10;

/// Draws detection boxes and `name conf` labels.
///
/// Without a font the label position is marked with a solid strip so the
/// box owner is still visible; text needs a TrueType font from config.
#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| anyhow!("{} is not a usable TrueType font", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    /// Load the configured font, falling back to strip labels on failure.
    pub fn from_font_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::with_font_file(path) {
                Ok(annotator) => annotator,
                Err(err) => {
                    log::warn!("label font unavailable, drawing boxes only: {:#}", err);
                    Self::new()
                }
            },
            None => Self::new(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw onto a copy of `frame`; the input is left untouched.
    pub fn annotate(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = frame.clone();
        for detection in detections {
            self.draw_detection(&mut canvas, &detection.bbox, &detection.label());
        }
        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, bbox: &BoundingBox, label: &str) {
        let (w, h) = canvas.dimensions();
        let (x1, y1, x2, y2) = bbox.clamped(w, h).to_pixels();
        if x2 <= x1 || y2 <= y1 {
            return;
        }
        for t in 0..BOX_THICKNESS {
            let bw = x2 - x1 - 2 * t;
            let bh = y2 - y1 - 2 * t;
            if bw <= 0 || bh <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(bw as u32, bh as u32);
            draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
        }

        let label_y = (y1 - LABEL_OFFSET).max(0);
        match &self.font {
            Some(font) => {
                let scale = PxScale::from(LABEL_HEIGHT);
                let top = (label_y - LABEL_HEIGHT as i32 / 2).max(0);
                draw_text_mut(canvas, BOX_COLOR, x1, top, scale, font, label);
            }
            None => {
                let strip_w = ((x2 - x1) as u32).min(w.saturating_sub(x1 as u32)).max(1);
                let strip = Rect::at(x1, label_y).of_size(strip_w, 4);
                draw_filled_rect_mut(canvas, strip, BOX_COLOR);
            }
        }
    }
}
