//! PDF to Word export
//!
//! [`TextDocxExporter`] writes the extracted text of each page into a minimal
//! WordprocessingML package. Layout, fonts and images are not carried over.

use std::io::{Cursor, Write};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::document::Document;
use crate::error::Result;

/// Media type of `.docx` files
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Converts a PDF into a Word document
pub trait WordExporter: Send + Sync {
    fn available(&self) -> bool;

    fn export(&self, document: &Document) -> Result<Vec<u8>>;
}

/// Text-only `.docx` export built from lopdf text extraction
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDocxExporter;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_OPEN: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_CLOSE: &str = "<w:sectPr/></w:body></w:document>";

const PAGE_BREAK: &str = r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#;

impl WordExporter for TextDocxExporter {
    fn available(&self) -> bool {
        true
    }

    fn export(&self, document: &Document) -> Result<Vec<u8>> {
        let page_count = document.page_count();
        let mut body = String::from(DOCUMENT_OPEN);

        for index in 0..page_count {
            if index > 0 {
                body.push_str(PAGE_BREAK);
            }
            // A page whose text cannot be decoded still gets its page break
            let text = match document.page_text(index) {
                Ok(text) => text,
                Err(e) => {
                    warn!(source = document.name(), page = index + 1, "Text extraction failed: {e}");
                    String::new()
                }
            };
            for line in text.lines() {
                push_paragraph(&mut body, line.trim_end());
            }
            debug!(page = index + 1, chars = text.len(), "Page text exported");
        }
        body.push_str(DOCUMENT_CLOSE);

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, part) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", PACKAGE_RELS),
            ("word/document.xml", body.as_str()),
        ] {
            writer.start_file(name, options)?;
            writer.write_all(part.as_bytes())?;
        }
        let bytes = writer.finish()?.into_inner();

        info!(pages = page_count, bytes = bytes.len(), "PDF converted to Word");
        Ok(bytes)
    }
}

fn push_paragraph(body: &mut String, line: &str) {
    if line.is_empty() {
        body.push_str("<w:p/>");
        return;
    }
    body.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
    escape_xml_into(body, line);
    body.push_str("</w:t></w:r></w:p>");
}

/// Escape markup characters and drop characters XML 1.0 cannot carry.
fn escape_xml_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::images_to_pdf;
    use crate::document::save_to_vec;
    use crate::image_ops::RasterImage;
    use image::DynamicImage;
    use lopdf::{dictionary, Object, Stream};
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_part(docx: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut part = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut part)
            .unwrap();
        part
    }

    /// A PDF whose pages show the given lines in Helvetica.
    fn text_pdf(pages: &[&[&str]]) -> Document {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let mut kids = Vec::new();
        for lines in pages {
            let content: String = lines
                .iter()
                .enumerate()
                .map(|(i, line)| format!("BT /F1 12 Tf 72 {} Td ({line}) Tj ET\n", 720 - 20 * i))
                .collect();
            let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => pages.len() as i64,
                "Kids" => kids,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let bytes = save_to_vec(&mut doc).unwrap();
        Document::from_bytes("notes.pdf", &bytes).unwrap()
    }

    #[test]
    fn test_export_carries_page_text_escaped() {
        let document = text_pdf(&[&["Q&A <draft>", "Total: 5 > 3"], &["Second page"]]);
        let docx = TextDocxExporter.export(&document).unwrap();
        let body = read_part(&docx, "word/document.xml");

        assert!(body.contains("Q&amp;A &lt;draft&gt;"), "body was {body}");
        assert!(body.contains("Total: 5 &gt; 3"), "body was {body}");
        assert!(!body.contains("<draft>"));

        let first = body.find("Q&amp;A").unwrap();
        let page_break = body.find(r#"w:type="page""#).unwrap();
        let second = body.find("Second page").unwrap();
        assert!(first < page_break && page_break < second);
        assert_eq!(body.matches(r#"w:type="page""#).count(), 1);
    }

    #[test]
    fn test_escape_xml() {
        let mut out = String::new();
        escape_xml_into(&mut out, "a<b> & \"c\"\u{1}");
        assert_eq!(out, "a&lt;b&gt; &amp; &quot;c&quot;");
    }

    #[test]
    fn test_paragraphs() {
        let mut body = String::new();
        push_paragraph(&mut body, "");
        push_paragraph(&mut body, "x & y");
        assert_eq!(
            body,
            r#"<w:p/><w:p><w:r><w:t xml:space="preserve">x &amp; y</w:t></w:r></w:p>"#
        );
    }

    #[test]
    fn test_export_package_layout() {
        let pages: Vec<RasterImage> = (0..3)
            .map(|_| RasterImage::new(DynamicImage::new_rgb8(8, 8), None))
            .collect();
        let document = images_to_pdf(&pages).unwrap();

        let exporter = TextDocxExporter;
        assert!(exporter.available());
        let docx = exporter.export(&document).unwrap();

        assert!(read_part(&docx, "[Content_Types].xml").contains("/word/document.xml"));
        assert!(read_part(&docx, "_rels/.rels").contains("word/document.xml"));
        let body = read_part(&docx, "word/document.xml");
        assert!(body.starts_with("<?xml"));
        assert_eq!(body.matches(r#"w:type="page""#).count(), 2);
        assert!(body.ends_with("</w:document>"));
    }
}
