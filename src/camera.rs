//! Camera frame acquisition.
//!
//! The camera serves single JPEG snapshots over HTTP. Acquisition retries
//! transient fetch failures a bounded number of times and nudges past stale
//! cached frames by re-fetching when two consecutive snapshots hash
//! identically. The duplicate loop is best-effort: exhausting it falls
//! through with the last frame fetched rather than failing the capture.

use std::collections::VecDeque;
use std::io::Read;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use url::Url;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Total fetch attempts per acquisition, shared by the retry and
/// duplicate-suppression loops.
pub const FETCH_ATTEMPTS: usize = 3;

const RETRY_DELAY: Duration = Duration::from_millis(350);
const DUPLICATE_DELAY: Duration = Duration::from_millis(450);

/// Source of single camera snapshots.
pub trait SnapshotSource: Send {
    /// Fetch one fresh JPEG from the camera.
    fn fetch(&mut self) -> Result<Vec<u8>>;
}

/// HTTP snapshot source for ESP32-class cameras.
///
/// Issues `GET {base}/capture` with a cache-busting query parameter and
/// no-cache headers; some camera firmwares serve a cached JPEG otherwise.
#[derive(Debug)]
pub struct HttpSnapshotSource {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpSnapshotSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url).context("parse camera base url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported camera scheme '{}'; expected http(s)",
                    other
                ))
            }
        }

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        })
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch(&mut self) -> Result<Vec<u8>> {
        let cache_buster = epoch_millis()?;
        let url = format!("{}/capture?cb={}", self.base_url, cache_buster);
        let response = self
            .agent
            .get(&url)
            .set("Cache-Control", "no-cache")
            .set("Pragma", "no-cache")
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.base_url))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read snapshot body")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot"));
        }
        Ok(bytes)
    }
}

/// Stub source replaying canned responses, for tests.
pub struct StubSnapshotSource {
    responses: VecDeque<Result<Vec<u8>, String>>,
}

impl StubSnapshotSource {
    pub fn new(responses: Vec<Result<Vec<u8>, String>>) -> Self {
        Self {
            responses: responses.into(),
        }
    }

    /// A source whose every fetch fails.
    pub fn unreachable() -> Self {
        Self {
            responses: VecDeque::new(),
        }
    }
}

impl SnapshotSource for StubSnapshotSource {
    fn fetch(&mut self) -> Result<Vec<u8>> {
        match self.responses.pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("camera unreachable")),
        }
    }
}

/// Acquire one frame, retrying failures and suppressing duplicates.
///
/// Fetch failures before the last attempt sleep briefly and retry; the
/// final failure propagates. A fetched frame whose hash matches the
/// previous fetch triggers a delayed re-fetch within the same attempt
/// budget, keeping whatever frame arrived last.
pub fn acquire_frame(source: &mut dyn SnapshotSource) -> Result<Vec<u8>> {
    let mut last_hash: Option<[u8; 32]> = None;
    let mut frame: Option<Vec<u8>> = None;

    for attempt in 0..FETCH_ATTEMPTS {
        let bytes = match source.fetch() {
            Ok(bytes) => bytes,
            Err(err) => {
                if attempt + 1 < FETCH_ATTEMPTS {
                    log::warn!("camera fetch attempt {} failed: {err:#}", attempt + 1);
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                return Err(err);
            }
        };

        let hash: [u8; 32] = Sha256::digest(&bytes).into();
        let duplicate = last_hash == Some(hash);
        last_hash = Some(hash);
        frame = Some(bytes);

        if !duplicate {
            break;
        }
        log::debug!(
            "camera served duplicate frame {}, re-fetching",
            hex::encode(&hash[..8])
        );
        std::thread::sleep(DUPLICATE_DELAY);
    }

    frame.ok_or_else(|| anyhow!("no frame fetched"))
}

fn epoch_millis() -> Result<u128> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis())
}
