//! Frame representation and geometry between native and inference resolution.
//!
//! Camera frames arrive in whatever pixel layout the capture device emits.
//! Everything downstream of ingestion works on `RgbImage` at the camera's
//! native resolution; only the detector sees the resized inference copy.

use std::borrow::Cow;

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::detect::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Nv12,
}

/// Raw bytes as handed over by a capture device.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Normalize into an RGB image at the frame's native resolution.
    pub fn into_rgb(self) -> Result<RgbImage> {
        let (width, height) = (self.width, self.height);
        let rgb = normalize_to_rgb(self.data, width, height, self.format)?;
        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))
    }
}

pub fn normalize_to_rgb(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            check_packed_len(&pixels, width, height)?;
            Ok(pixels)
        }
        PixelFormat::Bgr24 => {
            check_packed_len(&pixels, width, height)?;
            let mut pixels = pixels;
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(pixels)
        }
        PixelFormat::Nv12 => nv12_to_rgb(&pixels, width, height),
    }
}

fn check_packed_len(pixels: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("packed frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "packed frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(anyhow!("NV12 frames need even dimensions, got {}x{}", width, height));
    }
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane + y_plane / 2;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv] as f32 - 128.0;
            let v = pixels[uv + 1] as f32 - 128.0;

            rgb.push(clamp_to_u8(y + 1.402 * v));
            rgb.push(clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_to_u8(y + 1.772 * u));
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Inference geometry
// ----------------------------------------------------------------------------

/// Resize to `size x size` for the detector. Frames already at that size are
/// borrowed untouched.
pub fn resize_for_inference(frame: &RgbImage, size: u32) -> Cow<'_, RgbImage> {
    if frame.dimensions() == (size, size) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(imageops::resize(frame, size, size, FilterType::Triangle))
    }
}

/// Per-axis factors mapping inference coordinates onto the native frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactors {
    pub sx: f32,
    pub sy: f32,
}

impl ScaleFactors {
    /// `native / inference` on each axis independently.
    pub fn between(native: (u32, u32), inference: (u32, u32)) -> Self {
        let ratio = |n: u32, i: u32| if i == 0 { 1.0 } else { n as f32 / i as f32 };
        Self {
            sx: ratio(native.0, inference.0),
            sy: ratio(native.1, inference.1),
        }
    }

    pub fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        bbox.scaled(self.sx, self.sy)
    }
}
