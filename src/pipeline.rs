//! Capture-and-decide pipeline.
//!
//! One invocation walks a fixed sequence, terminal on the first applicable
//! branch: acquire a frame, decode it, look for watched animals, then fall
//! through to face embedding and identity matching. Every failure is caught
//! at this boundary and reported as a [`CaptureError`]; nothing propagates
//! past it.

use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, Mutex, RwLock};

use image::{imageops::FilterType, DynamicImage, ImageFormat};

use crate::camera::{acquire_frame, SnapshotSource};
use crate::detect::{AnimalKind, SharedDetector};
use crate::embed::SharedEmbedder;
use crate::matcher::{l2_normalize, match_embedding, MatchThresholds};
use crate::store::FaceStore;

const NO_FACE_MESSAGE: &str = "No human face detected.";
const INTRUDER_MESSAGE: &str = "Intruder detected!";

/// Closed set of failure kinds a capture cycle can report.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureError {
    FetchFailed(String),
    DecodeFailed(String),
    NoFaceDetected,
    Internal(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::FetchFailed(msg) => {
                write!(f, "failed to fetch frame from camera: {msg}")
            }
            CaptureError::DecodeFailed(msg) => write!(f, "failed to decode image: {msg}"),
            CaptureError::NoFaceDetected => write!(f, "no face detected"),
            CaptureError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Structured outcome of one detection cycle.
///
/// The unlock decision keys off this rather than sniffing the result text.
#[derive(Clone, Debug, PartialEq)]
pub enum Recognition {
    Animals(Vec<AnimalKind>),
    Known { name: String, confidence: f32 },
    Intruder,
    NoFace,
}

/// Successful capture cycle: human-readable result plus the frame it was
/// decided on, re-encoded as JPEG.
#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub result: String,
    pub jpeg: Vec<u8>,
    pub recognition: Recognition,
}

pub type CaptureOutcome = Result<CaptureReport, CaptureError>;

/// The capture pipeline with its collaborators.
///
/// Backends sit behind shared mutexes so concurrent cycles (a manual
/// capture overlapping a motion-triggered one) serialize per model without
/// excluding each other.
pub struct DetectionPipeline {
    source: Mutex<Box<dyn SnapshotSource>>,
    detector: SharedDetector,
    embedder: SharedEmbedder,
    store: Arc<RwLock<FaceStore>>,
    thresholds: MatchThresholds,
    animal_input: u32,
}

impl DetectionPipeline {
    pub fn new(
        source: Box<dyn SnapshotSource>,
        detector: SharedDetector,
        embedder: SharedEmbedder,
        store: Arc<RwLock<FaceStore>>,
        thresholds: MatchThresholds,
        animal_input: u32,
    ) -> Self {
        Self {
            source: Mutex::new(source),
            detector,
            embedder,
            store,
            thresholds,
            animal_input,
        }
    }

    /// Run one capture cycle to completion.
    pub fn run(&self) -> CaptureOutcome {
        let bytes = {
            let mut source = self
                .source
                .lock()
                .map_err(|_| CaptureError::Internal("snapshot source lock poisoned".into()))?;
            acquire_frame(source.as_mut())
                .map_err(|err| CaptureError::FetchFailed(format!("{err:#}")))?
        };

        let frame = image::load_from_memory(&bytes)
            .map_err(|err| CaptureError::DecodeFailed(err.to_string()))?;

        // Animals win over faces; a frame with a dog in it never reaches
        // the embedding model.
        let animals = self.detect_animals(&frame)?;
        if !animals.is_empty() {
            return Ok(CaptureReport {
                result: animal_message(&animals),
                jpeg: encode_jpeg(&frame)?,
                recognition: Recognition::Animals(animals),
            });
        }

        let Some(mut embedding) = self.embed_face(&frame)? else {
            return Ok(CaptureReport {
                result: NO_FACE_MESSAGE.to_string(),
                jpeg: encode_jpeg(&frame)?,
                recognition: Recognition::NoFace,
            });
        };
        l2_normalize(&mut embedding);

        let matched = {
            let store = self
                .store
                .read()
                .map_err(|_| CaptureError::Internal("face store lock poisoned".into()))?;
            match_embedding(&embedding, store.faces(), self.thresholds)
        };

        let jpeg = encode_jpeg(&frame)?;
        if matched.is_intruder() {
            Ok(CaptureReport {
                result: INTRUDER_MESSAGE.to_string(),
                jpeg,
                recognition: Recognition::Intruder,
            })
        } else {
            Ok(CaptureReport {
                result: format!("{} ({:.1}%)", matched.name, matched.confidence),
                jpeg,
                recognition: Recognition::Known {
                    name: matched.name,
                    confidence: matched.confidence,
                },
            })
        }
    }

    fn detect_animals(&self, frame: &DynamicImage) -> Result<Vec<AnimalKind>, CaptureError> {
        let size = self.animal_input;
        let resized = frame.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        let detections = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| CaptureError::Internal("animal detector lock poisoned".into()))?;
            detector
                .detect(resized.as_raw(), size, size)
                .map_err(|err| CaptureError::Internal(format!("animal detection failed: {err:#}")))?
        };

        let mut kinds: Vec<AnimalKind> = detections.into_iter().map(|d| d.kind).collect();
        kinds.sort();
        kinds.dedup();
        Ok(kinds)
    }

    /// Embed the frame's face, treating embedder failure as "no face".
    ///
    /// The embedder seam already falls back internally; an error out of it
    /// means neither backend produced anything usable, which the system
    /// reports the same way as an empty frame.
    fn embed_face(&self, frame: &DynamicImage) -> Result<Option<Vec<f32>>, CaptureError> {
        let mut embedder = self
            .embedder
            .lock()
            .map_err(|_| CaptureError::Internal("face embedder lock poisoned".into()))?;
        match embedder.embed(frame) {
            Ok(embedding) => Ok(embedding),
            Err(err) => {
                log::warn!("face embedding failed: {err:#}");
                Ok(None)
            }
        }
    }
}

fn animal_message(kinds: &[AnimalKind]) -> String {
    let labels: Vec<&str> = kinds.iter().map(AnimalKind::label).collect();
    format!("{} detected!", labels.join(" / "))
}

fn encode_jpeg(frame: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
    let mut buffer = Cursor::new(Vec::new());
    frame
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|err| CaptureError::Internal(format!("failed to encode frame: {err}")))?;
    Ok(buffer.into_inner())
}
