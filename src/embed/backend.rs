use std::sync::{Arc, Mutex};

use anyhow::Result;
use image::DynamicImage;

/// Dimension of every face embedding flowing through the system.
pub const EMBEDDING_DIM: usize = 512;

/// Face embedder trait.
///
/// Implementations run their own face localization on the full frame and
/// return `Ok(None)` when no face is confidently present. Returned vectors
/// are raw model output; callers normalize before use.
pub trait FaceEmbedder: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Compute an identity embedding for the most prominent face in `image`.
    fn embed(&mut self, image: &DynamicImage) -> Result<Option<Vec<f32>>>;
}

/// Shared handle to an embedder.
///
/// `Mutex` because `embed` takes `&mut self`; concurrent capture cycles
/// serialize per model but are otherwise independent.
pub type SharedEmbedder = Arc<Mutex<dyn FaceEmbedder>>;
