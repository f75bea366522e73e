//! Motion watcher.
//!
//! A single supervised background thread polls the serial link for motion
//! tokens. Each qualifying token dispatches an independent detection cycle
//! on its own thread; the cycle publishes its outcome to the shared
//! latest-capture cell and unlocks the door when it recognized an enrolled
//! face. The watcher itself never runs inference and never blocks on a
//! cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::pipeline::{DetectionPipeline, Recognition};
use crate::serial::{DoorLock, MotionPort};
use crate::{AutoCaptureFlag, LatestCapture};

/// Token the controller emits when its motion sensor trips.
pub const MOTION_TOKEN: &str = "MOTION";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct MotionWatcher {
    port: Box<dyn MotionPort>,
    pipeline: Arc<DetectionPipeline>,
    door: DoorLock,
    auto_capture: AutoCaptureFlag,
    latest: LatestCapture,
}

impl MotionWatcher {
    pub fn new(
        port: Box<dyn MotionPort>,
        pipeline: Arc<DetectionPipeline>,
        door: DoorLock,
        auto_capture: AutoCaptureFlag,
        latest: LatestCapture,
    ) -> Self {
        Self {
            port,
            pipeline,
            door,
            auto_capture,
            latest,
        }
    }

    /// Start the watcher thread. The returned handle stops and joins it.
    pub fn spawn(self) -> WatcherHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || self.run(shutdown_thread));
        WatcherHandle {
            shutdown,
            join: Some(join),
        }
    }

    fn run(mut self, shutdown: Arc<AtomicBool>) {
        log::info!("motion watcher running");
        while !shutdown.load(Ordering::SeqCst) {
            match self.port.poll_line() {
                Ok(Some(line)) => {
                    log::info!("serial: {line}");
                    if line == MOTION_TOKEN && self.auto_capture.is_enabled() {
                        log::info!("motion detected, dispatching capture");
                        self.dispatch_capture();
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!("serial read error: {err:#}");
                    std::thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        log::info!("motion watcher stopped");
    }

    /// Run one detection cycle on its own thread.
    ///
    /// The cycle is not cancelled by watcher shutdown; once started it runs
    /// to completion. Its outcome overwrites the latest-capture cell
    /// unconditionally, errors included.
    fn dispatch_capture(&self) {
        let pipeline = self.pipeline.clone();
        let door = self.door.clone();
        let latest = self.latest.clone();
        std::thread::spawn(move || {
            let outcome = pipeline.run();
            match &outcome {
                Ok(report) => {
                    if let Recognition::Known { name, confidence } = &report.recognition {
                        log::info!("recognized {name} ({confidence:.1}%), unlocking door");
                        door.unlock();
                    }
                }
                Err(err) => log::warn!("auto capture failed: {err}"),
            }
            // The cell write is the cycle's completion signal; actuation
            // precedes it.
            latest.store(outcome);
        });
    }
}

pub struct WatcherHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("motion watcher thread panicked"))?;
        }
        Ok(())
    }
}
