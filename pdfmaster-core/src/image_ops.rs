//! Raster image transforms
//!
//! Resizing with aspect-ratio policies, format conversion and quality-driven
//! compression. Decoding and encoding are done by the `image` crate; this
//! module decides dimensions, pixel layout and encoder settings.

use std::fmt;
use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Largest accepted width or height of a resize target
pub const MAX_TARGET_DIMENSION: u32 = 16_384;
/// Largest pixel count a resize may allocate, counting the intermediate
/// buffer of the two-pass resampler
pub const MAX_TARGET_PIXELS: u64 = 40_000_000;

/// Encoded image formats the service reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

/// Accepted target format names
pub const SUPPORTED_FORMATS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];

impl ImageKind {
    /// Parse a case-insensitive format name; `jpg` and `jpeg` are the same format.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageKind::Jpeg),
            "png" => Ok(ImageKind::Png),
            "webp" => Ok(ImageKind::Webp),
            "gif" => Ok(ImageKind::Gif),
            "bmp" => Ok(ImageKind::Bmp),
            "tiff" => Ok(ImageKind::Tiff),
            _ => Err(Error::invalid_input(format!(
                "Invalid format '{name}'. Supported: {}",
                SUPPORTED_FORMATS.join(", ")
            ))),
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::WebP => Some(ImageKind::Webp),
            ImageFormat::Gif => Some(ImageKind::Gif),
            ImageFormat::Bmp => Some(ImageKind::Bmp),
            ImageFormat::Tiff => Some(ImageKind::Tiff),
            _ => None,
        }
    }

    /// File extension used in artifact names
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
            ImageKind::Tiff => "tiff",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Webp => "image/webp",
            ImageKind::Gif => "image/gif",
            ImageKind::Bmp => "image/bmp",
            ImageKind::Tiff => "image/tiff",
        }
    }

    /// Formats whose encoder takes a quality setting
    pub fn is_lossy(self) -> bool {
        matches!(self, ImageKind::Jpeg | ImageKind::Webp)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoder quality in `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    /// Clamp `value` into `1..=100`.
    pub fn new(value: i64) -> Self {
        let clamped = value.clamp(Self::MIN as i64, Self::MAX as i64);
        if clamped != value {
            warn!(requested = value, used = clamped, "Quality out of range, clamped");
        }
        Quality(clamped as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality(85)
    }
}

/// Channel layout of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
    Other,
}

impl From<ColorType> for PixelMode {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::L8 | ColorType::L16 => PixelMode::Grayscale,
            ColorType::La8 | ColorType::La16 => PixelMode::GrayscaleAlpha,
            ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => PixelMode::Rgb,
            ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => PixelMode::Rgba,
            _ => PixelMode::Other,
        }
    }
}

impl PixelMode {
    pub fn has_alpha(self) -> bool {
        matches!(self, PixelMode::GrayscaleAlpha | PixelMode::Rgba)
    }
}

/// A decoded raster image and the format it was decoded from
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
    source_format: Option<ImageKind>,
}

impl RasterImage {
    pub fn new(image: DynamicImage, source_format: Option<ImageKind>) -> Self {
        Self {
            image,
            source_format,
        }
    }

    /// Decode an uploaded image, guessing the format from its content.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Error::decode(name, e))?;
        let source_format = reader.format().and_then(ImageKind::from_image_format);
        let image = reader.decode().map_err(|e| Error::decode(name, e))?;
        debug!(
            width = image.width(),
            height = image.height(),
            format = ?source_format,
            "Image decoded"
        );
        Ok(Self {
            image,
            source_format,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn pixel_mode(&self) -> PixelMode {
        self.image.color().into()
    }

    pub fn source_format(&self) -> Option<ImageKind> {
        self.source_format
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

/// An encoded image ready to be returned
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageKind,
    pub width: u32,
    pub height: u32,
}

/// Target dimensions for a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub maintain_aspect: bool,
}

impl ResizeRequest {
    /// Compute output dimensions for a `src_width` x `src_height` source.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> Result<(u32, u32)> {
        let (width, height) = match (self.width, self.height, self.maintain_aspect) {
            (None, None, _) => return Err(Error::invalid_input("Must specify width or height")),
            (Some(w), None, true) => {
                let ratio = w as f64 / src_width as f64;
                (w, scale(src_height, ratio))
            }
            (None, Some(h), true) => {
                let ratio = h as f64 / src_height as f64;
                (scale(src_width, ratio), h)
            }
            (Some(w), Some(h), true) => {
                let ratio = (w as f64 / src_width as f64).min(h as f64 / src_height as f64);
                (scale(src_width, ratio), scale(src_height, ratio))
            }
            (w, h, false) => (w.unwrap_or(src_width), h.unwrap_or(src_height)),
        };
        let (width, height) = (width.max(1), height.max(1));
        check_target_size(src_width, width, height)?;
        Ok((width, height))
    }
}

/// Reject targets whose buffers would not fit the resize budget. The
/// resampler scales height first, so it holds `src_width x height` pixels
/// before scaling the width.
fn check_target_size(src_width: u32, width: u32, height: u32) -> Result<()> {
    let pixels = u64::from(width) * u64::from(height);
    let intermediate = u64::from(src_width) * u64::from(height);
    if width > MAX_TARGET_DIMENSION
        || height > MAX_TARGET_DIMENSION
        || pixels.max(intermediate) > MAX_TARGET_PIXELS
    {
        return Err(Error::invalid_input(format!(
            "Target size {width}x{height} exceeds the resize limit of \
             {MAX_TARGET_DIMENSION} pixels per side and {MAX_TARGET_PIXELS} pixels in total"
        )));
    }
    Ok(())
}

/// Truncating scale, as the service has always rounded down.
fn scale(dimension: u32, ratio: f64) -> u32 {
    (dimension as f64 * ratio) as u32
}

/// Parse a textual width or height; empty and `auto` mean unset.
pub fn parse_dimension(field: &str, value: Option<&str>) -> Result<Option<u32>> {
    let Some(raw) = value.map(str::trim) else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "auto" {
        return Ok(None);
    }
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(Error::invalid_input(format!(
            "Invalid {field} '{raw}': expected a positive integer or 'auto'"
        ))),
        Ok(n) => Ok(Some(n)),
    }
}

/// Resize with Lanczos resampling.
pub fn resize(image: &RasterImage, request: &ResizeRequest) -> Result<RasterImage> {
    let (src_width, src_height) = image.dimensions();
    let (width, height) = request.target_dimensions(src_width, src_height)?;
    let resized = image
        .image
        .resize_exact(width, height, FilterType::Lanczos3);
    info!("Image resized: {src_width}x{src_height} -> {width}x{height}");
    Ok(RasterImage::new(resized, image.source_format))
}

/// Encode `image` as `target`.
///
/// JPEG targets are flattened onto white first. Quality applies to the lossy
/// formats (JPEG and WebP); the others ignore it.
pub fn convert(image: &RasterImage, target: ImageKind, quality: Quality) -> Result<EncodedImage> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();

    match target {
        ImageKind::Jpeg => {
            let prepared = prepare_for_jpeg(&image.image);
            let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.value());
            prepared.write_with_encoder(encoder)?;
        }
        ImageKind::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, PngFilter::Adaptive);
            image.image.write_with_encoder(encoder)?;
        }
        ImageKind::Webp => {
            let prepared = to_rgb_or_rgba(&image.image);
            let encoder = webp::Encoder::from_image(&prepared)
                .map_err(|e| Error::internal(format!("WebP encoder rejected image: {e}")))?;
            let encoded = encoder
                .encode_simple(false, f32::from(quality.value()))
                .map_err(|e| Error::internal(format!("WebP encoding failed: {e:?}")))?;
            bytes.extend_from_slice(&encoded);
        }
        ImageKind::Gif => {
            let rgba = image.image.to_rgba8();
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder.encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)?;
        }
        ImageKind::Bmp => {
            to_rgb_or_rgba(&image.image)
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Bmp)?;
        }
        ImageKind::Tiff => {
            to_rgb_or_rgba(&image.image)
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Tiff)?;
        }
    }

    debug!(
        target = %target,
        quality = target.is_lossy().then_some(quality.value()),
        output_bytes = bytes.len(),
        "Image encoded"
    );
    Ok(EncodedImage {
        bytes,
        format: target,
        width,
        height,
    })
}

/// Re-encode for size: an explicit target wins, PNG sources become JPEG,
/// everything else keeps its format.
pub fn compress_only(
    image: &RasterImage,
    quality: Quality,
    target: Option<ImageKind>,
) -> Result<EncodedImage> {
    let target = target.unwrap_or(match image.source_format {
        Some(ImageKind::Png) | None => ImageKind::Jpeg,
        Some(other) => other,
    });
    if !target.is_lossy() {
        debug!(target = %target, "Lossless target, quality {} has no effect", quality.value());
    }
    convert(image, target, quality)
}

/// Composite onto opaque white when the image carries alpha; coerce
/// anything that is not 8-bit gray or RGB to RGB.
pub fn prepare_for_jpeg(image: &DynamicImage) -> DynamicImage {
    let mode = PixelMode::from(image.color());
    if mode.has_alpha() {
        return DynamicImage::ImageRgb8(flatten_onto_white(image));
    }
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image.clone(),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Alpha-composite every pixel over a white background.
pub fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let a = a as u32;
            ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8
        };
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn to_rgb_or_rgba(image: &DynamicImage) -> DynamicImage {
    if PixelMode::from(image.color()).has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}
