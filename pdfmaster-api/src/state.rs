//! Shared application state

use std::sync::Arc;

use pdfmaster::{ArtifactStore, NoRasterizer, Rasterizer, TextDocxExporter, WordExporter};

use crate::config::Limits;

/// State shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: ArtifactStore,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub word: Arc<dyn WordExporter>,
    pub limits: Limits,
}

impl AppState {
    /// State with default limits, no rasterizer and the text-only Word exporter.
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            rasterizer: Arc::new(NoRasterizer),
            word: Arc::new(TextDocxExporter),
            limits: Limits::default(),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_word_exporter(mut self, word: Arc<dyn WordExporter>) -> Self {
        self.word = word;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}
