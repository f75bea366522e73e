mod stub;

#[cfg(feature = "backend-tract")]
mod tract;

pub use stub::StubAnimalDetector;

#[cfg(feature = "backend-tract")]
pub use tract::TractAnimalDetector;
