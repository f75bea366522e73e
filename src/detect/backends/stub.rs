use anyhow::Result;

use crate::detect::backend::{AnimalDetection, AnimalDetector};

/// Stub detector for testing and model-less deployments.
///
/// Always reports the configured detections regardless of frame content.
pub struct StubAnimalDetector {
    detections: Vec<AnimalDetection>,
}

impl StubAnimalDetector {
    /// A stub that never sees an animal.
    pub fn empty() -> Self {
        Self {
            detections: Vec::new(),
        }
    }

    pub fn with_detections(detections: Vec<AnimalDetection>) -> Self {
        Self { detections }
    }
}

impl Default for StubAnimalDetector {
    fn default() -> Self {
        Self::empty()
    }
}

impl AnimalDetector for StubAnimalDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<AnimalDetection>> {
        Ok(self.detections.clone())
    }
}
