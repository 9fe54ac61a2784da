use thiserror::Error;

use crate::page_range::PageRangeError;

/// Errors produced by pdfmaster operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad arguments, counts, modes or format names.
    #[error("{0}")]
    InvalidInput(String),

    /// A page selection resolved to no pages.
    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    /// A page specification could not be parsed.
    #[error(transparent)]
    PageRange(#[from] PageRangeError),

    /// An upload is not a valid document or image of the claimed type.
    #[error("Invalid file {source_name}: {detail}")]
    DecodeFailure { source_name: String, detail: String },

    /// An optional capability is not present in this deployment.
    #[error("{capability} is not available. {hint}")]
    ConversionUnavailable {
        capability: &'static str,
        hint: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidInput,
    DecodeFailure,
    ConversionUnavailable,
    InternalFailure,
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn decode(source_name: impl Into<String>, detail: impl ToString) -> Self {
        Error::DecodeFailure {
            source_name: source_name.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn internal(detail: impl ToString) -> Self {
        Error::Internal(detail.to_string())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Error::InvalidInput(_) | Error::InvalidRange(_) | Error::PageRange(_) => {
                ErrorClass::InvalidInput
            }
            Error::DecodeFailure { .. } => ErrorClass::DecodeFailure,
            Error::ConversionUnavailable { .. } => ErrorClass::ConversionUnavailable,
            Error::Internal(_) | Error::Io(_) | Error::Image(_) | Error::Zip(_) => {
                ErrorClass::InternalFailure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = Error::decode("a.pdf", "missing trailer");
        assert_eq!(error.to_string(), "Invalid file a.pdf: missing trailer");

        let error = Error::ConversionUnavailable {
            capability: "PDF rasterization",
            hint: "Install pdfium.".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "PDF rasterization is not available. Install pdfium."
        );
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(
            Error::invalid_input("bad").class(),
            ErrorClass::InvalidInput
        );
        assert_eq!(
            Error::InvalidRange("1-2".into()).class(),
            ErrorClass::InvalidInput
        );
        assert_eq!(
            Error::from(PageRangeError::EmptyToken).class(),
            ErrorClass::InvalidInput
        );
        assert_eq!(Error::decode("x", "y").class(), ErrorClass::DecodeFailure);
        assert_eq!(
            Error::from(IoError::new(ErrorKind::NotFound, "gone")).class(),
            ErrorClass::InternalFailure
        );
    }
}
