use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;

use crate::embed::backend::FaceEmbedder;

/// Stub embedder for testing and model-less deployments.
///
/// Returns a fixed embedding (or "no face") and counts invocations so tests
/// can assert when the face path was skipped entirely.
pub struct StubFaceEmbedder {
    embedding: Option<Vec<f32>>,
    calls: Arc<AtomicUsize>,
}

impl StubFaceEmbedder {
    pub fn no_face() -> Self {
        Self {
            embedding: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared invocation counter, incremented on every `embed` call.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl FaceEmbedder for StubFaceEmbedder {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn embed(&mut self, _image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.embedding.clone())
    }
}
