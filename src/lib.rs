//! doorwatch
//!
//! Camera-driven door controller: polls a networked camera for snapshots,
//! runs animal and face recognition on captured frames, and actuates a
//! door lock over a serial link.
//!
//! # Architecture
//!
//! - `camera`: snapshot acquisition with retry and duplicate suppression
//! - `detect` / `embed`: model seams (animal detection, face embedding)
//! - `matcher` / `store`: identity matching and enrolled-face persistence
//! - `pipeline`: the capture-and-decide state machine
//! - `serial` / `watch`: lock actuation and the motion-event loop
//! - `api`: the HTTP control surface
//!
//! Two triggers feed the pipeline: manual `/capture` requests and motion
//! tokens from the serial controller. Cycles may overlap; shared state is
//! limited to the enrolled-face store, the auto-capture flag, the
//! latest-capture cell, and the serial handle, each owned by an explicit
//! thread-safe container defined here or in its module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub mod api;
pub mod camera;
pub mod config;
pub mod detect;
pub mod embed;
pub mod matcher;
pub mod pipeline;
pub mod serial;
pub mod store;
pub mod watch;

pub use camera::{HttpSnapshotSource, SnapshotSource, StubSnapshotSource};
pub use config::DoorwatchConfig;
pub use detect::{AnimalDetection, AnimalDetector, AnimalKind, SharedDetector, StubAnimalDetector};
pub use embed::{FaceEmbedder, FallbackEmbedder, SharedEmbedder, StubFaceEmbedder, EMBEDDING_DIM};
pub use matcher::{match_embedding, MatchResult, MatchThresholds, INTRUDER};
pub use pipeline::{CaptureError, CaptureOutcome, CaptureReport, DetectionPipeline, Recognition};
pub use serial::{DoorLock, MotionPort, SerialLink};
pub use store::FaceStore;
pub use watch::{MotionWatcher, WatcherHandle, MOTION_TOKEN};

#[cfg(feature = "backend-tract")]
pub use detect::TractAnimalDetector;
#[cfg(feature = "backend-tract")]
pub use embed::TractFaceEmbedder;

/// Process-wide auto-capture toggle.
///
/// Read by the motion watcher before each dispatch, flipped by the control
/// surface. Relaxed ordering: a toggle racing a motion event may apply to
/// the next event instead, which is acceptable.
#[derive(Clone, Debug)]
pub struct AutoCaptureFlag(Arc<AtomicBool>);

impl AutoCaptureFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Flip the flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

impl Default for AutoCaptureFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Single-slot cell holding the most recent asynchronous capture outcome.
///
/// Overwritten unconditionally by each motion-triggered cycle, errors
/// included; manual captures never write it. Last write wins, no history.
#[derive(Clone, Default)]
pub struct LatestCapture(Arc<Mutex<Option<pipeline::CaptureOutcome>>>);

impl LatestCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, outcome: pipeline::CaptureOutcome) {
        let mut slot = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(outcome);
    }

    pub fn snapshot(&self) -> Option<pipeline::CaptureOutcome> {
        let slot = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone()
    }
}
