//! Animal detection.
//!
//! The object-detection model is an external collaborator; this module owns
//! the seam. Backends report which of the watched animal classes appear in
//! a frame; everything else the model can see is ignored.

mod backend;
mod backends;

pub use backend::{AnimalDetection, AnimalDetector, AnimalKind, SharedDetector};
pub use backends::StubAnimalDetector;

#[cfg(feature = "backend-tract")]
pub use backends::TractAnimalDetector;
