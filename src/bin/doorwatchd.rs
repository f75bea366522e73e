//! doorwatchd - door controller daemon
//!
//! This daemon:
//! 1. Loads the enrolled-face store
//! 2. Opens the serial link to the lock controller
//! 3. Watches for motion tokens and dispatches detection cycles
//! 4. Serves the HTTP control surface

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex, RwLock};

use anyhow::Result;
use clap::Parser;

use doorwatch::api::{ApiConfig, ApiContext, ApiServer};
use doorwatch::config::{DoorwatchConfig, ModelSettings};
use doorwatch::{
    AutoCaptureFlag, DetectionPipeline, DoorLock, FaceStore, HttpSnapshotSource, LatestCapture,
    MotionWatcher, SerialLink, SharedDetector, SharedEmbedder, StubAnimalDetector,
    StubFaceEmbedder,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera-driven door controller")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "DOORWATCH_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = DoorwatchConfig::load_path(args.config.as_deref())?;

    let store = FaceStore::load(&cfg.store_path)?;
    log::info!("known faces loaded: {:?}", store.names());
    let store = Arc::new(RwLock::new(store));

    let auto_capture = AutoCaptureFlag::default();
    let latest = LatestCapture::new();

    let serial = match SerialLink::open(&cfg.serial_device) {
        Ok(link) => {
            log::info!("serial link open on {}", cfg.serial_device.display());
            Some(link)
        }
        Err(err) => {
            log::warn!("could not open serial link: {err:#}");
            log::warn!("auto-capture and lock actuation disabled");
            None
        }
    };
    let door = match &serial {
        Some(link) => DoorLock::new(link.writer()?),
        None => DoorLock::disconnected(),
    };

    let source = HttpSnapshotSource::new(&cfg.camera.base_url, cfg.camera.timeout)?;
    let detector = build_detector(&cfg.models)?;
    let embedder = build_embedder(&cfg.models)?;

    let pipeline = Arc::new(DetectionPipeline::new(
        Box::new(source),
        detector,
        embedder.clone(),
        store.clone(),
        cfg.thresholds,
        cfg.models.animal_input,
    ));

    let watcher = serial.map(|link| {
        MotionWatcher::new(
            Box::new(link),
            pipeline.clone(),
            door.clone(),
            auto_capture.clone(),
            latest.clone(),
        )
        .spawn()
    });

    let api = ApiServer::new(
        ApiConfig {
            addr: cfg.api_addr.clone(),
        },
        ApiContext {
            pipeline,
            store,
            embedder,
            door,
            auto_capture,
            latest,
        },
    )
    .spawn()?;
    log::info!("control api listening on {}", api.addr);
    log::info!("doorwatchd running. camera at {}", cfg.camera.base_url);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("doorwatchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping...");

    if let Some(watcher) = watcher {
        watcher.stop()?;
    }
    api.stop()?;

    Ok(())
}

fn build_detector(models: &ModelSettings) -> Result<SharedDetector> {
    #[cfg(feature = "backend-tract")]
    if let Some(path) = &models.animal_model {
        let detector =
            doorwatch::TractAnimalDetector::new(path, models.animal_input, models.animal_input)?
                .with_threshold(models.animal_confidence);
        log::info!("animal detector: tract ({})", path.display());
        return Ok(Arc::new(Mutex::new(detector)));
    }

    if models.animal_model.is_some() {
        log::warn!("animal model configured but built without backend-tract; using stub detector");
    } else {
        log::warn!("no animal model configured; using stub detector");
    }
    Ok(Arc::new(Mutex::new(StubAnimalDetector::empty())))
}

fn build_embedder(models: &ModelSettings) -> Result<SharedEmbedder> {
    #[cfg(feature = "backend-tract")]
    if let Some(path) = &models.face_model {
        use doorwatch::{FallbackEmbedder, TractFaceEmbedder};

        let embedder: SharedEmbedder = match &models.face_presence_model {
            Some(presence) => {
                // Strict primary gated on face presence, relaxed fallback
                // without the gate.
                let min_score = models.face_presence_score.unwrap_or(0.5);
                let strict = TractFaceEmbedder::new(path, models.face_input)?
                    .with_presence_gate(presence, min_score)?;
                let relaxed = TractFaceEmbedder::new(path, models.face_input)?;
                Arc::new(Mutex::new(FallbackEmbedder::new(
                    Box::new(strict),
                    Box::new(relaxed),
                )))
            }
            None => Arc::new(Mutex::new(TractFaceEmbedder::new(path, models.face_input)?)),
        };
        log::info!("face embedder: tract ({})", path.display());
        return Ok(embedder);
    }

    if models.face_model.is_some() {
        log::warn!("face model configured but built without backend-tract; using stub embedder");
    } else {
        log::warn!("no face model configured; using stub embedder");
    }
    Ok(Arc::new(Mutex::new(StubFaceEmbedder::no_face())))
}
