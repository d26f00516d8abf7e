use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_classifier::CascadeParams;
use crate::detection::infrastructure::model_resolver::{self, ModelResolveError};
use crate::shared::constants::{
    CASCADE_MODEL_URL, CLUSTER_IOU_THRESHOLD, DEFAULT_FFMPEG_PATH, DEFAULT_FRAMES_DIR,
    DEFAULT_MEDIA_SERVER_URL, DEFAULT_REGISTRY_URL, DETECTION_INTERVAL, POLL_INTERVAL,
    REQUEST_TIMEOUT,
};
use crate::supervision::detection_task::DetectionSettings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Daemon settings, read from a JSON file. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub registry_url: String,
    pub media_server_url: String,
    pub ffmpeg_path: String,
    pub frames_dir: PathBuf,
    pub cascade_dir: Option<PathBuf>,
    pub cascade_url: String,
    pub poll_interval_secs: u64,
    pub detection_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub cascade: CascadeParams,
    pub cluster_iou_threshold: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            media_server_url: DEFAULT_MEDIA_SERVER_URL.to_string(),
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            frames_dir: PathBuf::from(DEFAULT_FRAMES_DIR),
            cascade_dir: None,
            cascade_url: CASCADE_MODEL_URL.to_string(),
            poll_interval_secs: POLL_INTERVAL.as_secs(),
            detection_interval_ms: DETECTION_INTERVAL.as_millis() as u64,
            request_timeout_secs: REQUEST_TIMEOUT.as_secs(),
            cascade: CascadeParams::default(),
            cluster_iou_threshold: CLUSTER_IOU_THRESHOLD,
        }
    }
}

impl SupervisorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        if self.detection_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "detection_interval_ms must be positive".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".into(),
            ));
        }
        let cascade = &self.cascade;
        if cascade.min_size <= 0 || cascade.min_size > cascade.max_size {
            return Err(ConfigError::Invalid(format!(
                "cascade sizes must satisfy 0 < min_size <= max_size (got {} and {})",
                cascade.min_size, cascade.max_size
            )));
        }
        if cascade.scale_factor <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "cascade scale_factor must exceed 1.0 (got {})",
                cascade.scale_factor
            )));
        }
        if cascade.shift_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cascade shift_factor must be positive (got {})",
                cascade.shift_factor
            )));
        }
        if !(self.cluster_iou_threshold > 0.0 && self.cluster_iou_threshold < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "cluster_iou_threshold must be within (0, 1) (got {})",
                self.cluster_iou_threshold
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            cascade: self.cascade,
            iou_threshold: self.cluster_iou_threshold,
            interval: Duration::from_millis(self.detection_interval_ms),
        }
    }

    /// Where the cascade model is cached; the user cache directory unless
    /// configured.
    pub fn cascade_dir(&self) -> Result<PathBuf, ModelResolveError> {
        match &self.cascade_dir {
            Some(dir) => Ok(dir.clone()),
            None => model_resolver::default_cache_dir(),
        }
    }
}
