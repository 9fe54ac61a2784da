//! Output artifacts and zip packaging

use std::collections::HashSet;
use std::io::{Cursor, Write};

use serde::Serialize;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

/// Media type of packaged archives
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// Optional measurements reported alongside an artifact.
///
/// The gateway turns these into `X-*` response headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Size of the delivered file
    pub file_size: Option<u64>,
    pub original_size: Option<u64>,
    pub new_size: Option<u64>,
    pub reduction_percent: Option<f64>,
    pub original_dimensions: Option<(u32, u32)>,
    pub new_dimensions: Option<(u32, u32)>,
    pub total_pages: Option<usize>,
    pub total_files: Option<usize>,
}

/// A named output file
#[derive(Debug, Clone)]
pub struct ConversionArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub diagnostics: Diagnostics,
}

impl ConversionArtifact {
    pub fn new(filename: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            media_type: media_type.into(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of [`package`]
#[derive(Debug, Clone)]
pub enum Packaged {
    /// A lone artifact, returned as-is
    Single(ConversionArtifact),
    /// A zip of several artifacts; `entries` lists their names in order
    Archive {
        artifact: ConversionArtifact,
        entries: Vec<String>,
    },
}

impl Packaged {
    pub fn artifact(&self) -> &ConversionArtifact {
        match self {
            Packaged::Single(artifact) | Packaged::Archive { artifact, .. } => artifact,
        }
    }

    pub fn into_artifact(self) -> ConversionArtifact {
        match self {
            Packaged::Single(artifact) | Packaged::Archive { artifact, .. } => artifact,
        }
    }
}

/// Return one artifact unchanged, or zip several into `archive_name`.
pub fn package(mut artifacts: Vec<ConversionArtifact>, archive_name: &str) -> Result<Packaged> {
    match artifacts.len() {
        0 => Err(Error::invalid_input("Nothing to package")),
        1 => Ok(Packaged::Single(artifacts.remove(0))),
        count => {
            let mut seen = HashSet::with_capacity(count);
            for artifact in &artifacts {
                if !seen.insert(artifact.filename.as_str()) {
                    return Err(Error::invalid_input(format!(
                        "Duplicate archive entry '{}'",
                        artifact.filename
                    )));
                }
            }

            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            let mut entries = Vec::with_capacity(count);
            for artifact in &artifacts {
                writer.start_file(artifact.filename.as_str(), options)?;
                writer.write_all(&artifact.bytes)?;
                entries.push(artifact.filename.clone());
            }
            let bytes = writer.finish()?.into_inner();
            debug!(entries = count, bytes = bytes.len(), "Archive written");

            let artifact = ConversionArtifact::new(archive_name, ZIP_MEDIA_TYPE, bytes)
                .with_diagnostics(Diagnostics {
                    total_files: Some(count),
                    ..Diagnostics::default()
                });
            Ok(Packaged::Archive { artifact, entries })
        }
    }
}
