//! Lossless PDF compression
//!
//! Re-encodes page content streams with Flate at the best level and drops
//! unreferenced objects. Page count and page content are unchanged; the
//! output is not guaranteed to be smaller than the input.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::Object;
use tracing::{debug, info};

use crate::document::{save_to_vec, Document};
use crate::error::Result;

/// Result of compressing a document
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Serialized compressed document
    pub bytes: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressionOutcome {
    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.original_size, self.compressed_size)
    }
}

/// `(original - compressed) / original * 100`, or 0 for an empty original.
///
/// Negative when the output grew.
pub fn reduction_percent(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

/// Compress the content streams of every page.
pub fn compress(document: &Document) -> Result<CompressionOutcome> {
    let mut doc = document.inner().clone();
    let mut rewritten = 0usize;

    let content_ids: Vec<_> = doc
        .get_pages()
        .into_values()
        .flat_map(|page_id| doc.get_page_contents(page_id))
        .collect();

    for id in content_ids {
        if let Ok(Object::Stream(stream)) = doc.get_object_mut(id) {
            let Some(raw) = plain_content(&stream.dict, &stream.content) else {
                continue;
            };
            let packed = deflate(&raw)?;
            if packed.len() < stream.content.len() {
                stream.dict.set("Filter", "FlateDecode");
                stream.dict.remove(b"DecodeParms");
                stream.set_content(packed);
                rewritten += 1;
            }
        }
    }

    let pruned = doc.prune_objects();
    debug!(
        source = document.name(),
        rewritten,
        pruned = pruned.len(),
        "Content streams rewritten"
    );

    let bytes = save_to_vec(&mut doc)?;
    let original_size = document.byte_len();
    let compressed_size = bytes.len() as u64;
    let reduction = reduction_percent(original_size, compressed_size);
    info!(
        "PDF compressed: {original_size} -> {compressed_size} bytes ({reduction:.1}% reduction)"
    );

    Ok(CompressionOutcome {
        bytes,
        original_size,
        compressed_size,
    })
}

/// Unfiltered bytes of a stream, if it is unfiltered or Flate-only.
fn plain_content(dict: &lopdf::Dictionary, content: &[u8]) -> Option<Vec<u8>> {
    match dict.get(b"Filter") {
        Err(_) => Some(content.to_vec()),
        Ok(filter) => {
            let name = match filter {
                Object::Name(name) => name.as_slice(),
                Object::Array(filters) if filters.len() == 1 => filters[0].as_name().ok()?,
                _ => return None,
            };
            if name != b"FlateDecode" || dict.has(b"DecodeParms") {
                return None;
            }
            let mut raw = Vec::new();
            ZlibDecoder::new(content).read_to_end(&mut raw).ok()?;
            Some(raw)
        }
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
