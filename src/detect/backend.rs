use std::sync::{Arc, Mutex};

use anyhow::Result;

/// Animal classes the controller reacts to.
///
/// Variant order is alphabetical so sorted detections read stably in
/// result messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnimalKind {
    Cat,
    Cow,
    Dog,
}

impl AnimalKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnimalKind::Cat => "Cat",
            AnimalKind::Cow => "Cow",
            AnimalKind::Dog => "Dog",
        }
    }

    /// Map a COCO class index to a watched animal, if it is one.
    pub fn from_coco_class(class: usize) -> Option<Self> {
        match class {
            15 => Some(AnimalKind::Cat),
            16 => Some(AnimalKind::Dog),
            19 => Some(AnimalKind::Cow),
            _ => None,
        }
    }
}

/// One detected animal with model confidence.
#[derive(Clone, Debug)]
pub struct AnimalDetection {
    pub kind: AnimalKind,
    pub confidence: f32,
}

/// Animal detector trait.
///
/// `pixels` is a tightly packed RGB8 buffer of `width * height` pixels,
/// already resized to the backend's input dimensions. Implementations must
/// treat the slice as read-only and ephemeral.
pub trait AnimalDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect watched animals in a frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<AnimalDetection>>;
}

/// Shared handle to a detector, mirroring [`crate::embed::SharedEmbedder`].
pub type SharedDetector = Arc<Mutex<dyn AnimalDetector>>;
