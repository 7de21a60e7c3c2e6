//! # `image`-crate Transform
//!
//! | Step | Implementation |
//! |---|---|
//! | Decode | `image::ImageReader` with guessed format and decoder limits |
//! | Fit `contain` | `DynamicImage::resize` (aspect preserved, fits inside the box) |
//! | Fit `cover` | `DynamicImage::resize_to_fill` (scale, then center crop) |
//! | Fit `fill` | `DynamicImage::resize_exact` |
//! | Encode JPEG | `JpegEncoder::new_with_quality` on RGB8 |
//! | Encode PNG/WebP/GIF | `DynamicImage::write_to` |
//!
//! All resizes use the Lanczos3 filter. The WebP encoder is lossless.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use imgsvc_core::transform_config::DEFAULT_JPEG_QUALITY;
use imgsvc_core::{FitMode, OutputFormat, TransformConfig};

use crate::{Transform, TransformError};

/// Largest source width or height accepted by the decoder.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;

/// Production [`Transform`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    filter: FilterType,
    max_source_dimension: u32,
}

impl ImageTransform {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
            max_source_dimension: MAX_SOURCE_DIMENSION,
        }
    }

    /// Override the decoder dimension limit.
    pub fn with_max_source_dimension(mut self, max: u32) -> Self {
        self.max_source_dimension = max;
        self
    }

    fn decode(&self, raw: &[u8]) -> Result<DynamicImage, TransformError> {
        let mut reader = ImageReader::new(Cursor::new(raw))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode(e.to_string()))?;
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_source_dimension);
        limits.max_image_height = Some(self.max_source_dimension);
        reader.limits(limits);
        reader.decode().map_err(|e| match e {
            ImageError::Limits(l) => TransformError::LimitsExceeded(l.to_string()),
            other => TransformError::Decode(other.to_string()),
        })
    }

    fn resize(&self, img: &DynamicImage, config: &TransformConfig) -> DynamicImage {
        let (w, h) = (config.width(), config.height());
        match config.fit() {
            FitMode::Contain => img.resize(w, h, self.filter),
            FitMode::Cover => img.resize_to_fill(w, h, self.filter),
            FitMode::Fill => img.resize_exact(w, h, self.filter),
        }
    }
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ImageTransform {
    fn transform(&self, raw: &[u8], config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
        let source = self.decode(raw)?;
        let resized = self.resize(&source, config);
        let out = encode(&resized, config)?;
        tracing::debug!(
            cfg_key = %config.cfg_key(),
            source_width = source.width(),
            source_height = source.height(),
            output_bytes = out.len(),
            "variant encoded"
        );
        Ok(out)
    }
}

fn encode(img: &DynamicImage, config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
    let format = config.format();
    let mut out = Cursor::new(Vec::new());
    let result = match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let quality = config.quality().unwrap_or(DEFAULT_JPEG_QUALITY);
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        }
        OutputFormat::Png => img.write_to(&mut out, ImageFormat::Png),
        OutputFormat::Webp => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, ImageFormat::WebP)
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut out, ImageFormat::Gif)
        }
    };
    result.map_err(|e| TransformError::Encode {
        format: format.as_str(),
        reason: e.to_string(),
    })?;
    Ok(out.into_inner())
}
