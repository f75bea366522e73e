use anyhow::Result;
use image::DynamicImage;

use crate::embed::backend::FaceEmbedder;

/// Two-stage embedder: a strict primary with a relaxed fallback.
///
/// The primary enforces face detection and is tried first. On any primary
/// failure, including a clean "no face" answer, the relaxed fallback runs.
/// A relaxed backend may produce an embedding without a confidently
/// localized face, which is a known false-acceptance risk; callers that
/// gate physical actuation accept that risk knowingly.
pub struct FallbackEmbedder {
    primary: Box<dyn FaceEmbedder>,
    fallback: Box<dyn FaceEmbedder>,
}

impl FallbackEmbedder {
    pub fn new(primary: Box<dyn FaceEmbedder>, fallback: Box<dyn FaceEmbedder>) -> Self {
        Self { primary, fallback }
    }
}

impl FaceEmbedder for FallbackEmbedder {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn embed(&mut self, image: &DynamicImage) -> Result<Option<Vec<f32>>> {
        match self.primary.embed(image) {
            Ok(Some(embedding)) => Ok(Some(embedding)),
            Ok(None) => {
                log::debug!(
                    "{} found no face, retrying with {}",
                    self.primary.name(),
                    self.fallback.name()
                );
                self.fallback.embed(image)
            }
            Err(err) => {
                log::warn!(
                    "{} failed ({err:#}), retrying with {}",
                    self.primary.name(),
                    self.fallback.name()
                );
                self.fallback.embed(image)
            }
        }
    }
}
