//! # pdfmaster
//!
//! Page selection, document assembly and image normalization behind the
//! pdfmaster HTTP service.
//!
//! ## Features
//!
//! - **Page ranges**: parse `"1,3,5-10"` into ordered page indices
//! - **Assembly**: merge, split and extract pages, build PDFs from images
//! - **Compression**: lossless re-encoding of page content streams
//! - **Images**: resize, recompress and convert between raster formats
//! - **Exports**: page rasterization (optional `pdfium` feature) and text-only Word export
//! - **Packaging**: bundle multiple outputs into a zip archive
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfmaster::{merge, parse_page_selection, split, Document, SplitMode};
//!
//! # fn main() -> pdfmaster::Result<()> {
//! let a = Document::from_bytes("a.pdf", &std::fs::read("a.pdf")?)?;
//! let b = Document::from_bytes("b.pdf", &std::fs::read("b.pdf")?)?;
//!
//! let merged = merge(&[a, b])?;
//! let selection = parse_page_selection("1,3-4", merged.page_count())?;
//! let parts = split(&merged, SplitMode::Range, Some(&selection))?;
//!
//! for (name, doc) in parts {
//!     std::fs::write(format!("{name}.pdf"), doc.into_bytes()?)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod bundle;
pub mod compress;
pub mod document;
pub mod error;
pub mod image_ops;
pub mod page_range;
pub mod raster;
pub mod storage;
pub mod word;


pub use assemble::{extract, images_to_pdf, merge, split, SplitMode};
pub use bundle::{package, ConversionArtifact, Diagnostics, Packaged};
pub use compress::{compress, reduction_percent, CompressionOutcome};
pub use document::{Document, DocumentInfo, PDF_MEDIA_TYPE};
pub use error::{Error, ErrorClass, Result};
pub use image_ops::{
    compress_only, convert, parse_dimension, resize, EncodedImage, ImageKind, PixelMode, Quality,
    RasterImage, ResizeRequest,
};
pub use page_range::{parse_page_selection, PageRangeError, PageSelection, PageSpec};
pub use raster::{export_pages, NoRasterizer, PageImageFormat, Rasterizer};
#[cfg(feature = "pdfium")]
pub use raster::PdfiumRasterizer;
pub use storage::{
    ArtifactSink, ArtifactStore, IdGenerator, MemorySink, RandomIds, SequentialIds, StagedArtifact,
    TempDirSink,
};
pub use word::{TextDocxExporter, WordExporter};

/// Current version of pdfmaster
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
