use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageReader, Limits};
use thiserror::Error;
use tracing::{debug, instrument};

pub const TARGET_WIDTH: u32 = 900;
pub const MAX_JPEG_QUALITY: u8 = 100;

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("jpeg encoding failed: width={width}, height={height}, reason={reason}")]
    JpegEncode {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("image has a zero dimension: {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error(
        "image too large: {width}x{height} = {pixels} pixels, max {max_pixels} pixels and {max_dimension} px per side"
    )]
    ImageTooLarge {
        width: u32,
        height: u32,
        pixels: u64,
        max_pixels: u64,
        max_dimension: u32,
    },

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("unsupported image format")]
    UnsupportedFormat,
}

#[derive(Clone, Debug)]
pub struct PrepareConfig {
    pub target_width: u32,
    pub jpeg_quality: u8,
    pub max_input_bytes: usize,
    /// Applies to the decoded image and to the resized output.
    pub max_dimension: u32,
    pub max_image_pixels: u64,
    pub max_alloc_bytes: u64,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            target_width: TARGET_WIDTH,
            jpeg_quality: MAX_JPEG_QUALITY,
            max_input_bytes: crate::capabilities::MAX_PICKED_IMAGE_BYTES,
            max_dimension: 15_000,
            max_image_pixels: 50_000_000,
            max_alloc_bytes: 512 * 1024 * 1024,
        }
    }
}

impl PrepareConfig {
    pub fn with_target_width(mut self, width: u32) -> Self {
        self.target_width = width.max(1);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, MAX_JPEG_QUALITY);
        self
    }
}

/// A picked image after resizing and re-encoding, ready for display and
/// upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    pub base64: String,
    pub display_uri: String,
}

/// Resizes `raw_bytes` to `config.target_width` (height follows the aspect
/// ratio) and re-encodes it as JPEG.
#[instrument(skip(config, raw_bytes), fields(input_size = raw_bytes.len()))]
pub fn prepare(
    config: &PrepareConfig,
    raw_bytes: &[u8],
) -> Result<PreparedImage, ImageProcessingError> {
    let img = decode_image(config, raw_bytes)?;
    let (w, h) = img.dimensions();
    let target_height = scaled_height(w, h, config.target_width)?;
    // A tall, narrow input can upscale far past anything the decoder accepted.
    ensure_within_limits(config, config.target_width, target_height)?;

    let resized = img.resize_exact(
        config.target_width,
        target_height,
        image::imageops::FilterType::Triangle,
    );

    let jpeg = encode_jpeg(&resized, config.jpeg_quality)?;
    let base64 = STANDARD.encode(&jpeg);
    let display_uri = format!("data:image/jpeg;base64,{base64}");

    debug!(
        from_width = w,
        from_height = h,
        width = config.target_width,
        height = target_height,
        output_size = jpeg.len(),
        "image prepared"
    );

    Ok(PreparedImage {
        width: config.target_width,
        height: target_height,
        jpeg,
        base64,
        display_uri,
    })
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> Result<u32, ImageProcessingError> {
    if width == 0 || height == 0 {
        return Err(ImageProcessingError::ZeroDimension { width, height });
    }
    let scaled = (f64::from(height) * f64::from(target_width) / f64::from(width)).round();
    Ok((scaled as u32).max(1))
}

fn decode_image(
    config: &PrepareConfig,
    raw_bytes: &[u8],
) -> Result<DynamicImage, ImageProcessingError> {
    if raw_bytes.is_empty() {
        return Err(ImageProcessingError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(ImageProcessingError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| ImageProcessingError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(ImageProcessingError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    let img = reader.decode()?;
    let (w, h) = img.dimensions();
    ensure_within_limits(config, w, h)?;

    Ok(img)
}

fn ensure_within_limits(
    config: &PrepareConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageProcessingError> {
    let pixels = u64::from(width) * u64::from(height);

    if width > config.max_dimension
        || height > config.max_dimension
        || pixels > config.max_image_pixels
    {
        return Err(ImageProcessingError::ImageTooLarge {
            width,
            height,
            pixels,
            max_pixels: config.max_image_pixels,
            max_dimension: config.max_dimension,
        });
    }

    Ok(())
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageProcessingError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let estimate = u64::from(width) * u64::from(height) * 3 / 8;
    let mut buffer = Vec::with_capacity(usize::try_from(estimate).unwrap_or(0));
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);

    encoder
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| ImageProcessingError::JpegEncode {
            width,
            height,
            reason: e.to_string(),
        })?;

    Ok(buffer)
}
