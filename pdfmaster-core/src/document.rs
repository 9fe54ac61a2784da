//! Parsed PDF documents
//!
//! [`Document`] wraps a `lopdf` document read from upload bytes. It is never
//! mutated in place; assembly and compression always build a new document.

use lopdf::{Dictionary, Object, ObjectId};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Media type of PDF artifacts
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A parsed, request-scoped PDF document
#[derive(Debug, Clone)]
pub struct Document {
    inner: lopdf::Document,
    name: String,
    byte_len: u64,
}

/// Document information dictionary entries
///
/// Absent entries are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub creator: String,
    pub producer: String,
}

impl Document {
    /// Parse a PDF from upload bytes. `name` identifies the source in errors.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        let inner = lopdf::Document::load_mem(bytes).map_err(|e| Error::decode(name, e))?;
        debug!(source = name, pages = inner.get_pages().len(), "PDF loaded");
        Ok(Self {
            inner,
            name: name.to_string(),
            byte_len: bytes.len() as u64,
        })
    }

    /// Wrap a freshly assembled document.
    pub(crate) fn assembled(name: impl Into<String>, inner: lopdf::Document) -> Self {
        Self {
            inner,
            name: name.into(),
            byte_len: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length of the bytes this document was parsed from; 0 for assembled documents.
    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    pub(crate) fn inner(&self) -> &lopdf::Document {
        &self.inner
    }

    /// Page object ids in page order.
    pub(crate) fn page_ids(&self) -> Vec<ObjectId> {
        self.inner.get_pages().into_values().collect()
    }

    /// Width and height in points of the page at `index`, from its (possibly inherited) MediaBox.
    pub fn page_size(&self, index: usize) -> Option<(f32, f32)> {
        let page_id = *self.page_ids().get(index)?;
        let page = self.inner.get_dictionary(page_id).ok()?;
        let media_box = match page.get(b"MediaBox") {
            Ok(object) => object.clone(),
            Err(_) => inherited_attribute(&self.inner, page, b"MediaBox")?,
        };
        let values = resolve(&self.inner, &media_box)
            .as_array()
            .ok()?
            .iter()
            .map(|v| number(resolve(&self.inner, v)))
            .collect::<Option<Vec<f32>>>()?;
        match values.as_slice() {
            [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
            _ => None,
        }
    }

    /// Read the trailer's `/Info` dictionary.
    pub fn info(&self) -> DocumentInfo {
        let info = self
            .inner
            .trailer
            .get(b"Info")
            .ok()
            .map(|object| resolve(&self.inner, object))
            .and_then(|object| object.as_dict().ok());

        let Some(info) = info else {
            return DocumentInfo::default();
        };

        let field = |key: &[u8]| -> String {
            info.get(key)
                .ok()
                .map(|object| resolve(&self.inner, object))
                .and_then(|object| object.as_str().ok())
                .map(decode_text_string)
                .unwrap_or_default()
        };

        DocumentInfo {
            title: field(b"Title"),
            author: field(b"Author"),
            subject: field(b"Subject"),
            creator: field(b"Creator"),
            producer: field(b"Producer"),
        }
    }

    /// Extract the text of the page at `index`.
    pub fn page_text(&self, index: usize) -> Result<String> {
        let page_number = u32::try_from(index + 1)
            .map_err(|_| Error::invalid_input(format!("Page index {index} is too large")))?;
        self.inner
            .extract_text(&[page_number])
            .map_err(|e| Error::decode(&self.name, e))
    }

    /// Serialize to PDF bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = self.inner.clone();
        save_to_vec(&mut doc)
    }

    /// Serialize to PDF bytes without cloning.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        save_to_vec(&mut self.inner)
    }
}

pub(crate) fn save_to_vec(doc: &mut lopdf::Document) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::internal(format!("failed to serialize PDF: {e}")))?;
    Ok(output)
}

/// Follow a reference to its target; other objects are returned as-is.
pub(crate) fn resolve<'a>(doc: &'a lopdf::Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Look up `key` on the ancestors of a page dictionary.
pub(crate) fn inherited_attribute(
    doc: &lopdf::Document,
    page: &Dictionary,
    key: &[u8],
) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    // Page trees are shallow; the bound guards against cycles in broken files
    for _ in 0..64 {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise Latin-1.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn doc_with_info(info: Dictionary) -> Document {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(200), Object::Integer(100)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(info);
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        let bytes = save_to_vec(&mut doc).unwrap();
        Document::from_bytes("info.pdf", &bytes).unwrap()
    }

    #[test]
    fn test_info_defaults_to_empty_strings() {
        let doc = doc_with_info(dictionary! {
            "Title" => Object::string_literal("Quarterly"),
        });
        let info = doc.info();
        assert_eq!(info.title, "Quarterly");
        assert_eq!(info.author, "");
        assert_eq!(info.producer, "");
    }

    #[test]
    fn test_info_decodes_utf16() {
        let mut title = vec![0xFE, 0xFF];
        for unit in "Résumé".encode_utf16() {
            title.extend_from_slice(&unit.to_be_bytes());
        }
        let doc = doc_with_info(dictionary! {
            "Title" => Object::String(title, lopdf::StringFormat::Hexadecimal),
        });
        assert_eq!(doc.info().title, "Résumé");
    }

    #[test]
    fn test_inherited_media_box() {
        let doc = doc_with_info(Dictionary::new());
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page_size(0), Some((200.0, 100.0)));
        assert_eq!(doc.page_size(1), None);
    }

    #[test]
    fn test_garbage_is_decode_failure() {
        let err = Document::from_bytes("notes.txt", b"hello").unwrap_err();
        match err {
            Error::DecodeFailure { source_name, .. } => assert_eq!(source_name, "notes.txt"),
            other => panic!("expected DecodeFailure, got {other:?}"),
        }
    }
}
