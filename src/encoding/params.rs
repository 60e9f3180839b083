//! Encoder parameters: blending, holdout strategy and noise.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EncodingError, Result};

/// `(inflection_point k, smoothing f)` of the logistic blending weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendingParams {
    /// Category size at which the category mean and the global mean weigh equally.
    pub inflection_point: f64,
    /// Steepness of the transition; larger values flatten it.
    pub smoothing: f64,
}

impl BlendingParams {
    pub fn new(inflection_point: f64, smoothing: f64) -> Result<Self> {
        if !inflection_point.is_finite() || !smoothing.is_finite() || smoothing <= 0.0 {
            return Err(EncodingError::invalid(format!(
                "blending needs a finite inflection point and a positive smoothing, got k={} f={}",
                inflection_point, smoothing
            )));
        }
        Ok(Self {
            inflection_point,
            smoothing,
        })
    }

    /// Weight of the category mean for a category of `n` rows.
    pub fn lambda(&self, n: f64) -> f64 {
        1.0 / (1.0 + (-(n - self.inflection_point) / self.smoothing).exp())
    }
}

impl Default for BlendingParams {
    fn default() -> Self {
        Self {
            inflection_point: 20.0,
            smoothing: 10.0,
        }
    }
}

/// How rows are kept from seeing their own target when encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldoutType {
    /// Encode every row with aggregates over all rows.
    #[default]
    None,
    /// Encode each row with aggregates over the other folds.
    KFold,
    /// Encode each row with aggregates excluding that row.
    LeaveOneOut,
}

impl HoldoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldoutType::None => "none",
            HoldoutType::KFold => "kfold",
            HoldoutType::LeaveOneOut => "loo",
        }
    }
}

impl fmt::Display for HoldoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform noise in `[-level, +level]` drawn from a stream seeded by `seed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSpec {
    pub level: f64,
    pub seed: u64,
}

impl NoiseSpec {
    pub fn new(level: f64, seed: u64) -> Result<Self> {
        if !(level >= 0.0 && level.is_finite()) {
            return Err(EncodingError::invalid(format!(
                "noise level must be a finite non-negative number, got {}",
                level
            )));
        }
        Ok(Self { level, seed })
    }
}
