use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::face_tracker::TrackerSettings;

pub const MAX_FACES_RANGE: (usize, usize) = (1, 3);
pub const INFERENCE_WIDTH_RANGE: (u32, u32) = (160, 1920);
pub const CONFIDENCE_RANGE: (f32, f32) = (0.0, 1.0);
pub const SMOOTHING_RANGE: (f32, f32) = (0.0, 2.0);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings read by the worker at the start of every cycle.
///
/// Copied in full under the configuration lock, so a cycle always runs with
/// one consistent set of values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_faces: usize,
    pub inference_width: u32,
    pub confidence_threshold: f32,
    pub smoothing_seconds: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_faces: 3,
            inference_width: 640,
            confidence_threshold: 0.30,
            smoothing_seconds: 0.6,
        }
    }
}

impl WorkerConfig {
    /// Load a JSON config file. Missing keys take their defaults; values
    /// are clamped to the supported ranges.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: WorkerConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.clamped())
    }

    /// Copy with every option forced into its supported range.
    /// Non-finite floats fall back to the default.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        Self {
            max_faces: self.max_faces.clamp(MAX_FACES_RANGE.0, MAX_FACES_RANGE.1),
            inference_width: self
                .inference_width
                .clamp(INFERENCE_WIDTH_RANGE.0, INFERENCE_WIDTH_RANGE.1),
            confidence_threshold: clamp_finite(
                self.confidence_threshold,
                CONFIDENCE_RANGE,
                defaults.confidence_threshold,
            ),
            smoothing_seconds: clamp_finite(
                self.smoothing_seconds,
                SMOOTHING_RANGE,
                defaults.smoothing_seconds,
            ),
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            max_faces: self.max_faces,
            smoothing_seconds: self.smoothing_seconds,
            confidence_threshold: self.confidence_threshold,
        }
    }
}

fn clamp_finite(value: f32, (lo, hi): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}
