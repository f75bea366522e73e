//! Face embedding sources.
//!
//! The embedding model is an external collaborator; this module owns only
//! the seam. Backends turn a full frame into a 512-dimensional identity
//! embedding, or report that no face is present.

mod backend;
mod backends;

pub use backend::{FaceEmbedder, SharedEmbedder, EMBEDDING_DIM};
pub use backends::{FallbackEmbedder, StubFaceEmbedder};

#[cfg(feature = "backend-tract")]
pub use backends::TractFaceEmbedder;
