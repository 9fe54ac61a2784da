//! Multipart form handling

use std::collections::HashMap;
use std::path::Path;

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::debug;

use crate::error::AppError;

/// An uploaded file part
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// Reject uploads whose declared content type does not mention PDF.
    pub fn require_pdf(&self) -> Result<(), AppError> {
        match &self.content_type {
            Some(content_type) if content_type.contains("pdf") => Ok(()),
            _ => Err(AppError::bad_request(format!(
                "File {} is not a PDF",
                self.filename
            ))),
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.filename)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A fully read multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<(String, Upload)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every part of the form. Parts with a file name are files,
    /// everything else is a text field.
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").trim_end_matches("[]").to_string();

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    debug!(field = %name, filename = %filename, bytes = bytes.len(), "File received");
                    form.files.push((
                        name,
                        Upload {
                            filename,
                            content_type,
                            bytes,
                        },
                    ));
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Remove and return the first file sent as `name`.
    pub fn take_file(&mut self, name: &str) -> Result<Upload, AppError> {
        let position = self
            .files
            .iter()
            .position(|(field, _)| field == name)
            .ok_or_else(|| AppError::bad_request(format!("No file provided in '{name}'")))?;
        Ok(self.files.remove(position).1)
    }

    /// Remove and return every file sent as `name`, in upload order.
    pub fn take_files(&mut self, name: &str) -> Vec<Upload> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|(field, _)| field == name);
        self.files = rest;
        matching.into_iter().map(|(_, upload)| upload).collect()
    }

    /// A text field, with surrounding whitespace removed. Empty values count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Parse a form boolean the way HTML forms and most clients send them.
pub fn parse_bool(field: &str, value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::bad_request(format!(
            "Invalid {field} '{value}': expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn upload(filename: &str, content_type: Option<&str>) -> Upload {
        Upload {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"data"),
        }
    }

    #[test]
    fn test_require_pdf() {
        assert!(upload("a.pdf", Some("application/pdf")).require_pdf().is_ok());
        assert!(upload("a.pdf", Some("application/x-pdf")).require_pdf().is_ok());

        let err = upload("a.txt", Some("text/plain")).require_pdf().unwrap_err();
        assert_eq!(err.to_string(), "File a.txt is not a PDF");
        assert!(upload("a.pdf", None).require_pdf().is_err());
    }

    #[test]
    fn test_stem() {
        assert_eq!(upload("report.final.pdf", None).stem(), "report.final");
        assert_eq!(upload("photo", None).stem(), "photo");
    }

    #[test]
    fn test_take_files_keeps_order() {
        let mut form = UploadForm::default();
        form.files.push(("files".into(), upload("1.pdf", None)));
        form.files.push(("file".into(), upload("other.pdf", None)));
        form.files.push(("files".into(), upload("2.pdf", None)));

        let names: Vec<String> = form
            .take_files("files")
            .into_iter()
            .map(|u| u.filename)
            .collect();
        assert_eq!(names, vec!["1.pdf", "2.pdf"]);
        assert_eq!(form.take_file("file").unwrap().filename, "other.pdf");
        assert!(form.take_file("file").is_err());
    }

    #[test]
    fn test_text_fields() {
        let mut form = UploadForm::default();
        form.fields.insert("pages".into(), " 1-3 ".into());
        form.fields.insert("width".into(), "  ".into());
        assert_eq!(form.text("pages"), Some("1-3"));
        assert_eq!(form.text("width"), None);
        assert_eq!(form.text("height"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("maintain_aspect", "True").unwrap());
        assert!(!parse_bool("maintain_aspect", "0").unwrap());
        assert!(parse_bool("maintain_aspect", "maybe").is_err());
    }
}
