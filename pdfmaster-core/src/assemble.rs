//! Document assembly: merge, split and page extraction
//!
//! Every operation builds a new `lopdf` document with a fresh catalog and
//! page tree. Source documents are never modified.

use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use tracing::{debug, info};

use crate::document::{inherited_attribute, Document};
use crate::error::{Error, Result};
use crate::image_ops::{prepare_for_jpeg, RasterImage};
use crate::page_range::PageSelection;

/// Fewest documents accepted by [`merge`]
pub const MIN_MERGE_INPUTS: usize = 2;
/// Most documents accepted by [`merge`]
pub const MAX_MERGE_INPUTS: usize = 20;

/// Resolution at which images are placed on PDF pages
pub const IMAGE_PAGE_DPI: f32 = 100.0;
/// JPEG quality of images embedded by [`images_to_pdf`]
const IMAGE_PAGE_QUALITY: u8 = 95;

/// Page attributes that may be inherited from the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Split mode specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// One document per page
    All,
    /// One document holding the selected pages
    Range,
}

impl FromStr for SplitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SplitMode::All),
            "range" => Ok(SplitMode::Range),
            other => Err(Error::invalid_input(format!(
                "Invalid mode '{other}'. Use 'all' to split all pages, or 'range' with pages parameter"
            ))),
        }
    }
}

/// Merge documents into one, appending all pages in input order.
pub fn merge(documents: &[Document]) -> Result<Document> {
    if documents.len() < MIN_MERGE_INPUTS {
        return Err(Error::invalid_input(format!(
            "At least {MIN_MERGE_INPUTS} PDF files are required"
        )));
    }
    if documents.len() > MAX_MERGE_INPUTS {
        return Err(Error::invalid_input(format!(
            "Maximum {MAX_MERGE_INPUTS} PDF files allowed"
        )));
    }

    let parts: Vec<(&Document, PageSelection)> = documents
        .iter()
        .map(|doc| (doc, PageSelection::all(doc.page_count())))
        .collect();

    let merged = assemble("merged", &parts)?;
    info!(pages = merged.page_count(), "Merged PDF created");
    Ok(merged)
}

/// Split a document.
///
/// [`SplitMode::All`] yields `page_1 .. page_N`; [`SplitMode::Range`] yields a
/// single `split_pages` document with the selected pages in selection order.
pub fn split(
    document: &Document,
    mode: SplitMode,
    selection: Option<&PageSelection>,
) -> Result<Vec<(String, Document)>> {
    let total_pages = document.page_count();
    if total_pages == 0 {
        return Err(Error::invalid_input("PDF has no pages"));
    }

    match mode {
        SplitMode::All => {
            // object 1 is the page tree root of every single-page output
            let shared = Renumbered::new(document, 2);
            let pages = (0..total_pages)
                .map(|index| {
                    let name = format!("page_{}", index + 1);
                    let mut builder = Builder::new();
                    builder.copy_pages(&shared, &PageSelection::from_indices([index], total_pages))?;
                    let page = builder.finish(&name);
                    Ok((name, page))
                })
                .collect::<Result<Vec<_>>>()?;
            info!(source = document.name(), pages = pages.len(), "PDF split into pages");
            Ok(pages)
        }
        SplitMode::Range => {
            let selection = selection.ok_or_else(|| {
                Error::invalid_input("Range mode requires a pages parameter")
            })?;
            let extracted = extract(document, selection)?;
            info!(
                source = document.name(),
                pages = extracted.page_count(),
                "Page range extracted"
            );
            Ok(vec![("split_pages".to_string(), extracted)])
        }
    }
}

/// Build a document from the selected pages of `document`.
pub fn extract(document: &Document, selection: &PageSelection) -> Result<Document> {
    if selection.is_empty() {
        return Err(Error::InvalidRange(format!(
            "no selected pages within 1-{}",
            document.page_count()
        )));
    }
    assemble("extracted", &[(document, selection.clone())])
}

/// Build a PDF with one page per image, in order.
///
/// Images are embedded as JPEG; transparent images are flattened onto white.
pub fn images_to_pdf(images: &[RasterImage]) -> Result<Document> {
    if images.is_empty() {
        return Err(Error::invalid_input("At least 1 image required"));
    }

    let mut output = lopdf::Document::with_version("1.5");
    let pages_id = output.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for image in images {
        let prepared = prepare_for_jpeg(image.as_dynamic());
        let (width, height) = (prepared.width(), prepared.height());
        let color_space = match prepared.color() {
            ColorType::L8 => "DeviceGray",
            _ => "DeviceRGB",
        };

        let mut jpeg = Vec::new();
        prepared.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, IMAGE_PAGE_QUALITY))?;

        let image_id = output.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let page_width = width as f32 * 72.0 / IMAGE_PAGE_DPI;
        let page_height = height as f32 * 72.0 / IMAGE_PAGE_DPI;
        let content = format!("q {page_width:.2} 0 0 {page_height:.2} 0 0 cm /Im0 Do Q");
        let content_id = output.add_object(Stream::new(lopdf::Dictionary::new(), content.into_bytes()));

        let page_id = output.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page_width.into()),
                Object::Real(page_height.into()),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    output.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = output.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    output.trailer.set("Root", catalog_id);

    info!(pages = images.len(), "PDF created from images");
    Ok(Document::assembled("converted", output))
}

/// Copy the selected pages of each part, in order, into a new document.
fn assemble(name: &str, parts: &[(&Document, PageSelection)]) -> Result<Document> {
    let mut builder = Builder::new();
    for (document, selection) in parts {
        let source = Renumbered::new(document, builder.output.max_id + 1);
        builder.copy_pages(&source, selection)?;
    }
    Ok(builder.finish(name))
}

/// A source document whose object ids start at a chosen number
struct Renumbered<'a> {
    document: &'a Document,
    objects: lopdf::Document,
    page_ids: Vec<ObjectId>,
}

impl<'a> Renumbered<'a> {
    fn new(document: &'a Document, first_id: u32) -> Self {
        let mut objects = document.inner().clone();
        objects.renumber_objects_with(first_id);
        let page_ids = objects.get_pages().into_values().collect();
        Self {
            document,
            objects,
            page_ids,
        }
    }
}

/// Output document under construction, with its page tree root reserved
struct Builder {
    output: lopdf::Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Builder {
    fn new() -> Self {
        let mut output = lopdf::Document::with_version("1.5");
        let pages_id = output.new_object_id();
        Self {
            output,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Append the selected pages of `source` along with the objects they reference.
    fn copy_pages(&mut self, source: &Renumbered<'_>, selection: &PageSelection) -> Result<()> {
        // new page objects are numbered above every source id
        self.output.max_id = self.output.max_id.max(source.objects.max_id);

        for &index in selection.indices() {
            let page_id = *source.page_ids.get(index).ok_or_else(|| {
                Error::internal(format!(
                    "page index {index} out of bounds for {}",
                    source.document.name()
                ))
            })?;
            let original = source
                .objects
                .get_dictionary(page_id)
                .map_err(|e| Error::decode(source.document.name(), e))?;

            let mut page = original.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(&source.objects, original, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            self.copy_referenced(&source.objects, &page);
            page.set("Parent", self.pages_id);
            self.kids.push(Object::Reference(self.output.add_object(page)));
        }
        debug!(
            source = source.document.name(),
            pages = selection.len(),
            "Copied pages"
        );
        Ok(())
    }

    /// Copy every non-structural object reachable from `page`.
    fn copy_referenced(&mut self, source: &lopdf::Document, page: &Dictionary) {
        let mut pending = Vec::new();
        push_dictionary_references(page, &mut pending);
        while let Some(id) = pending.pop() {
            if self.output.objects.contains_key(&id) {
                continue;
            }
            let Ok(object) = source.get_object(id) else {
                continue;
            };
            if is_structural(object) {
                continue;
            }
            push_references(object, &mut pending);
            self.output.objects.insert(id, object.clone());
        }
    }

    fn finish(mut self, name: &str) -> Document {
        let count = self.kids.len() as i64;
        self.output.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.output.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.output.trailer.set("Root", catalog_id);
        Document::assembled(name, self.output)
    }
}

fn push_references(object: &Object, pending: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => pending.push(*id),
        Object::Array(items) => items.iter().for_each(|item| push_references(item, pending)),
        Object::Dictionary(dict) => push_dictionary_references(dict, pending),
        Object::Stream(stream) => push_dictionary_references(&stream.dict, pending),
        _ => {}
    }
}

fn push_dictionary_references(dict: &Dictionary, pending: &mut Vec<ObjectId>) {
    for (_, value) in dict.iter() {
        push_references(value, pending);
    }
}

/// Catalog, page tree and outline nodes are rebuilt, never copied.
fn is_structural(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return false,
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline")
    )
}
