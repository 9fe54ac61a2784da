//! Page rasterization
//!
//! Rendering PDF pages needs a real renderer. The [`Rasterizer`] trait is the
//! seam; [`NoRasterizer`] stands in when none is installed, and
//! `PdfiumRasterizer` (feature `pdfium`) binds the system pdfium library.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::DynamicImage;
use tracing::{debug, info};

use crate::bundle::{ConversionArtifact, Diagnostics};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::image_ops::{flatten_onto_white, ImageKind};

/// Default rendering resolution
pub const DEFAULT_DPI: u32 = 150;
/// Highest accepted rendering resolution
pub const MAX_DPI: u32 = 600;
/// JPEG quality of exported pages
const PAGE_JPEG_QUALITY: u8 = 95;

const CAPABILITY: &str = "PDF to image conversion";

/// Renders every page of a document to an image
pub trait Rasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the backing renderer can be used in this process.
    fn available(&self) -> bool;

    /// Render all pages in order at `dpi`.
    fn rasterize(&self, document: &Document, dpi: u32) -> Result<Vec<DynamicImage>>;
}

/// Placeholder used when no renderer is installed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRasterizer;

impl Rasterizer for NoRasterizer {
    fn name(&self) -> &'static str {
        "none"
    }

    fn available(&self) -> bool {
        false
    }

    fn rasterize(&self, _document: &Document, _dpi: u32) -> Result<Vec<DynamicImage>> {
        Err(unavailable())
    }
}

fn unavailable() -> Error {
    Error::ConversionUnavailable {
        capability: CAPABILITY,
        hint: "Build with the `pdfium` feature and install the pdfium shared library.".to_string(),
    }
}

/// Image format of exported pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl PageImageFormat {
    /// `png` selects PNG; anything else, including unknown names, selects JPEG.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => PageImageFormat::Png,
            _ => PageImageFormat::Jpeg,
        }
    }

    pub fn kind(self) -> ImageKind {
        match self {
            PageImageFormat::Jpeg => ImageKind::Jpeg,
            PageImageFormat::Png => ImageKind::Png,
        }
    }
}

/// Render every page and encode each as `page_<n>.<ext>`.
pub fn export_pages(
    rasterizer: &dyn Rasterizer,
    document: &Document,
    dpi: u32,
    format: PageImageFormat,
) -> Result<Vec<ConversionArtifact>> {
    if !rasterizer.available() {
        return Err(unavailable());
    }
    if dpi == 0 || dpi > MAX_DPI {
        return Err(Error::invalid_input(format!(
            "DPI must be between 1 and {MAX_DPI}"
        )));
    }

    let pages = rasterizer.rasterize(document, dpi)?;
    if pages.is_empty() {
        return Err(Error::decode(
            document.name(),
            "Could not extract pages from PDF",
        ));
    }

    let kind = format.kind();
    let total_pages = pages.len();
    let artifacts = pages
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let bytes = encode_page(page, format)?;
            debug!(page = index + 1, bytes = bytes.len(), "Page encoded");
            Ok(ConversionArtifact::new(
                format!("page_{}.{}", index + 1, kind.extension()),
                kind.media_type(),
                bytes,
            )
            .with_diagnostics(Diagnostics {
                total_pages: Some(total_pages),
                ..Diagnostics::default()
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        source = document.name(),
        renderer = rasterizer.name(),
        pages = total_pages,
        "PDF converted to images"
    );
    Ok(artifacts)
}

fn encode_page(page: &DynamicImage, format: PageImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        PageImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(flatten_onto_white(page));
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, PAGE_JPEG_QUALITY))?;
        }
        PageImageFormat::Png => {
            page.write_with_encoder(PngEncoder::new(&mut bytes))?;
        }
    }
    Ok(bytes)
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use image::DynamicImage;
    use pdfium_render::prelude::*;
    use tracing::{debug, warn};

    use super::Rasterizer;
    use crate::document::Document;
    use crate::error::{Error, Result};

    /// Renders pages with the system pdfium library
    #[derive(Debug, Clone)]
    pub struct PdfiumRasterizer {
        available: bool,
    }

    impl PdfiumRasterizer {
        /// Probe for the pdfium shared library.
        pub fn probe() -> Self {
            let available = match Pdfium::bind_to_system_library() {
                Ok(_) => true,
                Err(e) => {
                    warn!("pdfium library not found: {e:?}");
                    false
                }
            };
            Self { available }
        }

        fn bind() -> Result<Pdfium> {
            Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| Error::internal(format!("failed to bind pdfium: {e:?}")))
        }
    }

    impl Rasterizer for PdfiumRasterizer {
        fn name(&self) -> &'static str {
            "pdfium"
        }

        fn available(&self) -> bool {
            self.available
        }

        fn rasterize(&self, document: &Document, dpi: u32) -> Result<Vec<DynamicImage>> {
            let pdfium = Self::bind()?;
            let bytes = document.to_bytes()?;
            let pdf = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| Error::decode(document.name(), format!("{e:?}")))?;

            let scale = dpi as f32 / 72.0;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale);

            let mut images = Vec::new();
            for (index, page) in pdf.pages().iter().enumerate() {
                let bitmap = page.render_with_config(&config).map_err(|e| {
                    Error::internal(format!("failed to render page {}: {e:?}", index + 1))
                })?;
                let image = bitmap.as_image();
                debug!(
                    page = index + 1,
                    width = image.width(),
                    height = image.height(),
                    "Page rendered"
                );
                images.push(image);
            }
            Ok(images)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::images_to_pdf;
    use crate::error::ErrorClass;
    use crate::image_ops::RasterImage;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    /// Stands in for a renderer by returning a fixed set of pages.
    struct FixedPages(Vec<DynamicImage>);

    impl Rasterizer for FixedPages {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn available(&self) -> bool {
            true
        }

        fn rasterize(&self, _document: &Document, _dpi: u32) -> Result<Vec<DynamicImage>> {
            Ok(self.0.clone())
        }
    }

    fn one_page_pdf() -> Document {
        let image = RasterImage::new(DynamicImage::new_rgb8(20, 10), None);
        images_to_pdf(&[image]).unwrap()
    }

    fn translucent_page() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 0])))
    }

    #[test]
    fn test_missing_renderer_is_unavailable() {
        let err = export_pages(&NoRasterizer, &one_page_pdf(), 150, PageImageFormat::Jpeg)
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::ConversionUnavailable);
        assert!(err.to_string().contains("pdfium"));
    }

    #[test]
    fn test_pages_are_named_in_order() {
        let rasterizer = FixedPages(vec![translucent_page(), translucent_page()]);
        let artifacts =
            export_pages(&rasterizer, &one_page_pdf(), 150, PageImageFormat::Jpeg).unwrap();

        let names: Vec<&str> = artifacts.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["page_1.jpg", "page_2.jpg"]);
        assert_eq!(artifacts[0].media_type, "image/jpeg");
        assert_eq!(artifacts[1].diagnostics.total_pages, Some(2));

        // transparent pixels are flattened to white
        let decoded = image::load_from_memory(&artifacts[0].bytes).unwrap().to_rgb8();
        let pixel = decoded.get_pixel(1, 1);
        assert!(pixel.0.iter().all(|&c| c > 240), "pixel was {pixel:?}");
    }

    #[test]
    fn test_png_pages() {
        let rasterizer = FixedPages(vec![translucent_page()]);
        let artifacts =
            export_pages(&rasterizer, &one_page_pdf(), 72, PageImageFormat::Png).unwrap();
        assert_eq!(artifacts[0].filename, "page_1.png");
        assert_eq!(artifacts[0].media_type, "image/png");
        let decoded = image::load_from_memory(&artifacts[0].bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn test_empty_render_is_decode_failure() {
        let err = export_pages(&FixedPages(Vec::new()), &one_page_pdf(), 150, PageImageFormat::Png)
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::DecodeFailure);
    }

    #[test]
    fn test_dpi_bounds() {
        let rasterizer = FixedPages(vec![translucent_page()]);
        assert!(export_pages(&rasterizer, &one_page_pdf(), 0, PageImageFormat::Png).is_err());
        assert!(export_pages(&rasterizer, &one_page_pdf(), MAX_DPI + 1, PageImageFormat::Png).is_err());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(PageImageFormat::from_name("PNG"), PageImageFormat::Png);
        assert_eq!(PageImageFormat::from_name("jpeg"), PageImageFormat::Jpeg);
        assert_eq!(PageImageFormat::from_name("tiff"), PageImageFormat::Jpeg);
    }
}
