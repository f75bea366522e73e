use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::matcher::MatchThresholds;

const DEFAULT_STORE_PATH: &str = "known_faces.json";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8760";
const DEFAULT_CAMERA_URL: &str = "http://192.168.0.101";
const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_ANIMAL_INPUT: u32 = 320;
const DEFAULT_ANIMAL_CONFIDENCE: f32 = 0.25;
const DEFAULT_FACE_INPUT: u32 = 160;

#[derive(Debug, Deserialize, Default)]
struct DoorwatchConfigFile {
    store_path: Option<String>,
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    serial: Option<SerialConfigFile>,
    matcher: Option<MatcherConfigFile>,
    models: Option<ModelsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    device: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct MatcherConfigFile {
    similarity_threshold: Option<f32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelsConfigFile {
    animal_model: Option<PathBuf>,
    animal_input: Option<u32>,
    animal_confidence: Option<f32>,
    face_model: Option<PathBuf>,
    face_presence_model: Option<PathBuf>,
    face_presence_score: Option<f32>,
    face_input: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DoorwatchConfig {
    pub store_path: String,
    pub api_addr: String,
    pub camera: CameraSettings,
    pub serial_device: PathBuf,
    pub thresholds: MatchThresholds,
    pub models: ModelSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub animal_model: Option<PathBuf>,
    pub animal_input: u32,
    pub animal_confidence: f32,
    pub face_model: Option<PathBuf>,
    pub face_presence_model: Option<PathBuf>,
    pub face_presence_score: Option<f32>,
    pub face_input: u32,
}

impl DoorwatchConfig {
    /// Load from the file named by `DOORWATCH_CONFIG`, then apply env
    /// overrides and validate. No file means defaults.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DOORWATCH_CONFIG").ok();
        Self::load_path(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit path (or defaults when `None`).
    pub fn load_path(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DoorwatchConfigFile) -> Self {
        let store_path = file
            .store_path
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let camera = CameraSettings {
            base_url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.base_url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            timeout: Duration::from_secs(
                file.camera
                    .as_ref()
                    .and_then(|camera| camera.timeout_secs)
                    .unwrap_or(DEFAULT_CAMERA_TIMEOUT_SECS),
            ),
        };
        let serial_device = file
            .serial
            .and_then(|serial| serial.device)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERIAL_DEVICE));
        let defaults = MatchThresholds::default();
        let thresholds = MatchThresholds {
            similarity: file
                .matcher
                .as_ref()
                .and_then(|matcher| matcher.similarity_threshold)
                .unwrap_or(defaults.similarity),
            confidence: file
                .matcher
                .as_ref()
                .and_then(|matcher| matcher.confidence_threshold)
                .unwrap_or(defaults.confidence),
        };
        let models_file = file.models.unwrap_or_default();
        let models = ModelSettings {
            animal_model: models_file.animal_model,
            animal_input: models_file.animal_input.unwrap_or(DEFAULT_ANIMAL_INPUT),
            animal_confidence: models_file
                .animal_confidence
                .unwrap_or(DEFAULT_ANIMAL_CONFIDENCE),
            face_model: models_file.face_model,
            face_presence_model: models_file.face_presence_model,
            face_presence_score: models_file.face_presence_score,
            face_input: models_file.face_input.unwrap_or(DEFAULT_FACE_INPUT),
        };

        Self {
            store_path,
            api_addr,
            camera,
            serial_device,
            thresholds,
            models,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("DOORWATCH_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("DOORWATCH_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.base_url = url;
            }
        }
        if let Ok(device) = std::env::var("DOORWATCH_SERIAL_DEVICE") {
            if !device.trim().is_empty() {
                self.serial_device = PathBuf::from(device);
            }
        }
        if let Ok(path) = std::env::var("DOORWATCH_STORE_PATH") {
            if !path.trim().is_empty() {
                self.store_path = path;
            }
        }
        if let Ok(timeout) = std::env::var("DOORWATCH_CAMERA_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("DOORWATCH_CAMERA_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.camera.timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.camera.base_url)
            .map_err(|err| anyhow!("invalid camera base url: {err}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "camera base url must be http(s), got '{}'",
                url.scheme()
            ));
        }
        if self.camera.timeout.as_secs() == 0 {
            return Err(anyhow!("camera timeout must be greater than zero"));
        }
        if !(-1.0..=1.0).contains(&self.thresholds.similarity) {
            return Err(anyhow!("similarity threshold must be within [-1, 1]"));
        }
        if !(0.0..=100.0).contains(&self.thresholds.confidence) {
            return Err(anyhow!("confidence threshold must be within [0, 100]"));
        }
        if self.models.animal_input == 0 || self.models.face_input == 0 {
            return Err(anyhow!("model input sizes must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.models.animal_confidence) {
            return Err(anyhow!("animal confidence must be within [0, 1]"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DoorwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
