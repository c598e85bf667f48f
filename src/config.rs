//! Engine configuration
//!
//! Settings are plain serde structs so hosts can keep them next to their own
//! configuration and hand them over as JSON.

use crate::error::InferenceError;
use serde::{Deserialize, Serialize};

/// Default number of inference cycles averaged per face
pub const DEFAULT_AVERAGE_WINDOW: usize = 5;

/// Default minimum jump for a value to count as a spike
pub const DEFAULT_SPIKE_AMPLITUDE: f64 = 0.25;

/// How term memberships and rule results are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Product AND inside a rule, CF-weighted sum across rules
    #[default]
    WeightedSum,
    /// Minimum AND inside a rule, maximum of CF-weighted results across rules
    Classic,
}

/// Temporal smoothing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Number of scores averaged per face (at least 1)
    pub window: usize,
    /// Correct single-sample spikes in history
    pub suppress_spikes: bool,
    /// Jump relative to both neighbours that marks a spike
    pub spike_amplitude: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_AVERAGE_WINDOW,
            suppress_spikes: false,
            spike_amplitude: DEFAULT_SPIKE_AMPLITUDE,
        }
    }
}

impl SmoothingConfig {
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.window < 1 {
            return Err(InferenceError::InvalidConfig(
                "averaging window must be at least 1".to_string(),
            ));
        }
        if !self.spike_amplitude.is_finite() || self.spike_amplitude < 0.0 {
            return Err(InferenceError::InvalidConfig(format!(
                "spike amplitude must be a finite value >= 0, got {}",
                self.spike_amplitude
            )));
        }
        Ok(())
    }

    /// Maximum history length kept per face
    pub fn capacity(&self) -> usize {
        self.window + self.pending()
    }

    /// Newest entries excluded from the average while they may still be corrected
    pub fn pending(&self) -> usize {
        if self.suppress_spikes {
            2
        } else {
            0
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// The number of detections to average
    pub average: usize,
    /// Enable spike suppression
    pub suppress_spikes: bool,
    /// Amplitude for a value to be considered a spike
    pub spike_amplitude: f64,
    /// Clamp law-of-cosines results into [-1, 1] before taking the arc cosine
    pub clamp_cosines: bool,
    /// Fuzzy AND/OR semantics
    pub aggregation: Aggregation,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            average: DEFAULT_AVERAGE_WINDOW,
            suppress_spikes: false,
            spike_amplitude: DEFAULT_SPIKE_AMPLITUDE,
            clamp_cosines: true,
            aggregation: Aggregation::WeightedSum,
        }
    }
}

impl EngineSettings {
    pub fn smoothing(&self) -> SmoothingConfig {
        SmoothingConfig {
            window: self.average,
            suppress_spikes: self.suppress_spikes,
            spike_amplitude: self.spike_amplitude,
        }
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        self.smoothing().validate()
    }

    /// Load settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, InferenceError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to JSON
    pub fn to_json(&self) -> Result<String, InferenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
