use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_CLIP_EXTENSION, DEFAULT_MAX_AGE, DEFAULT_N_INIT, DEFAULT_SIMILARITY_THRESHOLD,
};
use super::error::SpotlightError;

/// Default minimum YOLO face score for a box to reach the embedding stage.
pub const DEFAULT_DETECTOR_CONFIDENCE: f64 = 0.5;

/// Tunables for one tracking run.
///
/// Loaded from JSON; any field left out takes its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub similarity_threshold: f64,
    pub n_init: usize,
    pub max_age: usize,
    /// Worker threads for clip extraction; 0 means one per available core.
    pub clip_workers: usize,
    pub clip_extension: String,
    pub detector_confidence: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            n_init: DEFAULT_N_INIT,
            max_age: DEFAULT_MAX_AGE,
            clip_workers: 0,
            clip_extension: DEFAULT_CLIP_EXTENSION.to_string(),
            detector_confidence: DEFAULT_DETECTOR_CONFIDENCE,
        }
    }
}

impl TrackingConfig {
    pub fn load(path: &Path) -> Result<Self, SpotlightError> {
        let json = fs::read_to_string(path).map_err(|e| {
            SpotlightError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            SpotlightError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SpotlightError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SpotlightError::InvalidConfig(format!(
                "similarity_threshold must be between -1.0 and 1.0, got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) {
            return Err(SpotlightError::InvalidConfig(format!(
                "detector_confidence must be between 0.0 and 1.0, got {}",
                self.detector_confidence
            )));
        }
        if self.n_init == 0 {
            return Err(SpotlightError::InvalidConfig("n_init must be at least 1".into()));
        }
        if self.max_age == 0 {
            return Err(SpotlightError::InvalidConfig("max_age must be at least 1".into()));
        }
        let ext = self.clip_extension.as_str();
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(SpotlightError::InvalidConfig(format!(
                "clip_extension must be a bare extension like 'mp4', got '{ext}'"
            )));
        }
        Ok(())
    }

    /// Resolves `clip_workers == 0` to the machine's available parallelism.
    pub fn effective_clip_workers(&self) -> usize {
        if self.clip_workers > 0 {
            return self.clip_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
