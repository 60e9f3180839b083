//! Encoder configuration, persisted as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoding::params::{BlendingParams, HoldoutType, NoiseSpec};
use crate::error::Result;
use crate::task::TuningProfile;

const CONFIG_FILE: &str = "encoder_config.json";

// ── Encoder Config ──────────────────────────────────────────────────

/// Settings shared by every encoding run of a [`crate::context::Context`].
///
/// Unset `rows_per_segment` / `worker_threads` fall back to the probed
/// [`TuningProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub blending: BlendingParams,
    pub with_blending: bool,
    pub noise_level: f64,
    /// Noise seed; `None` leaves the choice to the caller.
    pub seed: Option<u64>,
    pub holdout: HoldoutType,
    pub rows_per_segment: Option<usize>,
    pub worker_threads: Option<usize>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            blending: BlendingParams::default(),
            with_blending: true,
            noise_level: 0.01,
            seed: None,
            holdout: HoldoutType::None,
            rows_per_segment: None,
            worker_threads: None,
        }
    }
}

impl EncoderConfig {
    /// Read config from `dir`. Returns None if the file doesn't exist.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Write config to `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        BlendingParams::new(self.blending.inflection_point, self.blending.smoothing)?;
        NoiseSpec::new(self.noise_level, 0)?;
        Ok(())
    }

    /// Noise for a run, using `seed` when the config carries none.
    /// A zero noise level means no noise.
    pub fn noise(&self, seed: u64) -> Result<Option<NoiseSpec>> {
        if self.noise_level == 0.0 {
            return Ok(None);
        }
        NoiseSpec::new(self.noise_level, self.seed.unwrap_or(seed)).map(Some)
    }

    /// `profile` with this config's overrides applied.
    pub fn tuning(&self, profile: TuningProfile) -> TuningProfile {
        TuningProfile {
            worker_threads: self.worker_threads.unwrap_or(profile.worker_threads).max(1),
            rows_per_segment: self.rows_per_segment.unwrap_or(profile.rows_per_segment).max(1),
            ..profile
        }
    }
}
