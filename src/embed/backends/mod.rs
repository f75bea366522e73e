mod fallback;
mod stub;

#[cfg(feature = "backend-tract")]
mod tract;

pub use fallback::FallbackEmbedder;
pub use stub::StubFaceEmbedder;

#[cfg(feature = "backend-tract")]
pub use tract::TractFaceEmbedder;
