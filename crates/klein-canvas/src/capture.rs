//! Frame capture: normalize the surface into a fixed-size JPEG snapshot.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use klein_core::types::Rgb;
use thiserror::Error;
use tracing::debug;

use crate::surface::DrawingSurface;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("surface is not readable ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },

    #[error("surface lock poisoned")]
    Poisoned,

    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where the scaled source lands inside the square target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Largest uniform scale that fits `src` inside a `target` square, centred.
    pub fn letterbox(src_width: u32, src_height: u32, target: u32) -> Self {
        let scale = f64::min(
            target as f64 / src_width as f64,
            target as f64 / src_height as f64,
        );
        let width = ((src_width as f64 * scale).round() as u32).clamp(1, target);
        let height = ((src_height as f64 * scale).round() as u32).clamp(1, target);
        Self {
            x: (target - width) / 2,
            y: (target - height) / 2,
            width,
            height,
        }
    }
}

/// An encoded capture ready to be sent.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
}

impl CapturedFrame {
    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg))
    }
}

/// Captures square frames of a fixed side length and JPEG quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameCapture {
    size: u32,
    quality: u8,
}

impl FrameCapture {
    pub fn new(size: u32, quality: u8) -> Self {
        Self {
            size,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn capture(
        &self,
        surface: &DrawingSurface,
        background: Rgb,
    ) -> Result<CapturedFrame, CaptureError> {
        if surface.is_empty() || self.size == 0 {
            return Err(CaptureError::EmptySurface {
                width: surface.width(),
                height: surface.height(),
            });
        }

        let [r, g, b] = background.0;
        let mut canvas = RgbaImage::from_pixel(self.size, self.size, Rgba([r, g, b, 255]));

        let placement = Placement::letterbox(surface.width(), surface.height(), self.size);
        let scaled = imageops::resize(
            surface.image(),
            placement.width,
            placement.height,
            FilterType::Triangle,
        );
        imageops::overlay(&mut canvas, &scaled, placement.x as i64, placement.y as i64);

        let rgb = DynamicImage::ImageRgba8(canvas).into_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&rgb)?;

        debug!(
            src_width = surface.width(),
            src_height = surface.height(),
            ?placement,
            bytes = jpeg.len(),
            "Captured frame"
        );

        Ok(CapturedFrame { jpeg })
    }
}
