//! Temporal smoothing
//!
//! This module keeps a bounded history of raw emotion scores per face and
//! exposes their moving average as the stable score. Optional spike
//! suppression rewrites a history entry that jumps away from both of its
//! neighbours.

use crate::config::SmoothingConfig;
use crate::error::InferenceError;
use crate::types::{EmotionScore, FaceId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Per-face score history with moving-average readout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalSmoother {
    config: SmoothingConfig,
    histories: HashMap<FaceId, VecDeque<EmotionScore>>,
}

impl TemporalSmoother {
    /// Create a smoother; the config is validated
    pub fn new(config: SmoothingConfig) -> Result<Self, InferenceError> {
        config.validate()?;
        Ok(Self {
            config,
            histories: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    /// Add the newest raw score for a face
    pub fn record(&mut self, face: FaceId, score: EmotionScore) {
        let config = self.config;
        let history = self
            .histories
            .entry(face)
            .or_insert_with(|| VecDeque::with_capacity(config.capacity() + 1));

        if config.suppress_spikes && history.len() >= config.capacity() {
            suppress_spike(history, &score, config.spike_amplitude, face);
        }

        history.push_back(score);
        while history.len() > config.capacity() {
            history.pop_front();
        }
    }

    /// Stable score for one emotion of a face.
    ///
    /// Returns 0 while there is not enough history. With spike suppression the
    /// newest two entries are left out since they may still be corrected.
    pub fn average(&self, face: FaceId, emotion: &str) -> f64 {
        let Some(history) = self.histories.get(&face) else {
            return 0.0;
        };
        let pending = self.config.pending();
        if history.len() <= pending {
            return 0.0;
        }

        let settled = history.len() - pending;
        let sum: f64 = history
            .iter()
            .take(settled)
            .map(|score| score.get(emotion).copied().unwrap_or(0.0))
            .sum();
        sum / settled as f64
    }

    /// Stable scores for the given emotions, in the given order
    pub fn averages(&self, face: FaceId, emotions: &[String]) -> Vec<(String, f64)> {
        emotions
            .iter()
            .map(|emotion| (emotion.clone(), self.average(face, emotion)))
            .collect()
    }

    /// Stored history for a face, oldest first
    pub fn history(&self, face: FaceId) -> Option<&VecDeque<EmotionScore>> {
        self.histories.get(&face)
    }

    /// Faces with history, ascending
    pub fn faces(&self) -> Vec<FaceId> {
        let mut faces: Vec<FaceId> = self.histories.keys().copied().collect();
        faces.sort_unstable();
        faces
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }

    /// Forget one face; returns whether it had history
    pub fn clear_face(&mut self, face: FaceId) -> bool {
        self.histories.remove(&face).is_some()
    }

    /// Load smoother state from JSON.
    ///
    /// Histories longer than the configured capacity keep their newest entries.
    pub fn from_json(json: &str) -> Result<Self, InferenceError> {
        let mut smoother: Self = serde_json::from_str(json)?;
        smoother.config.validate()?;

        let capacity = smoother.config.capacity();
        for (face, history) in &mut smoother.histories {
            if history.len() > capacity {
                debug!(face = *face, stored = history.len(), capacity, "trimming loaded history");
                let excess = history.len() - capacity;
                history.drain(..excess);
            }
        }
        Ok(smoother)
    }

    /// Serialize smoother state to JSON
    pub fn to_json(&self) -> Result<String, InferenceError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Compare the newest stored entry with its predecessor and the incoming score;
/// a value beyond `amplitude` from both is replaced by their mean.
fn suppress_spike(
    history: &mut VecDeque<EmotionScore>,
    incoming: &EmotionScore,
    amplitude: f64,
    face: FaceId,
) {
    let len = history.len();
    if len < 2 {
        return;
    }
    let (front, back) = history.make_contiguous().split_at_mut(len - 1);
    let before = &front[len - 2];
    let last = &mut back[0];

    for (emotion, &nv) in incoming {
        let (Some(&lv), Some(v)) = (before.get(emotion), last.get_mut(emotion)) else {
            continue;
        };
        let peak = *v >= lv + amplitude && *v >= nv + amplitude;
        let dip = *v <= lv - amplitude && *v <= nv - amplitude;
        if peak || dip {
            let corrected = (lv + nv) / 2.0;
            trace!(face, emotion = %emotion, from = *v, to = corrected, "suppressing spike");
            *v = corrected;
        }
    }
}
