//! # pdfmaster-api
//!
//! REST API server for the pdfmaster library
//!

mod api;
pub mod config;
mod error;
mod state;
mod upload;


pub use api::{
    app, attachment_disposition, compress_image, compress_pdf, convert_image, diagnostic_headers,
    health_check, images_to_pdf_handler, merge_pdfs, pdf_info, pdf_to_images, pdf_to_word,
    resize_image, root, split_pdf, ConvertParams, ImageCompressParams, PdfCompressParams,
    PdfInfoResponse,
};
pub use config::{Limits, ServerConfig};
pub use error::{AppError, ErrorResponse};
pub use state::AppState;
pub use upload::{Upload, UploadForm};
