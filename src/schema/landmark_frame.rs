//! face.landmark_frame.v1 schema definition
//!
//! One record per video frame, carrying the faces a landmark detector found
//! in it. Frames are usually exchanged as NDJSON, one record per line.

use crate::types::{DetectedFace, FaceId, LandmarkSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Current schema version
pub const SCHEMA_VERSION: &str = "face.landmark_frame.v1";

/// Detected faces of one video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Schema version (always "face.landmark_frame.v1")
    pub schema_version: String,
    /// Frame sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    /// Capture time of the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Faces in detection order
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

impl LandmarkFrame {
    /// Create a frame record with the current schema version
    pub fn new(faces: Vec<DetectedFace>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            frame: None,
            timestamp: None,
            faces,
        }
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Convenience constructor from bare landmark sets, ids by position
    pub fn from_landmarks<I>(landmarks: I) -> Self
    where
        I: IntoIterator<Item = LandmarkSet>,
    {
        Self::new(landmarks.into_iter().map(DetectedFace::new).collect())
    }

    /// Validate the frame
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        let mut seen: HashSet<FaceId> = HashSet::new();
        for (index, face) in self.faces.iter().enumerate() {
            let id = face.id.unwrap_or(index as FaceId);
            if !seen.insert(id) {
                return Err(ValidationError::DuplicateFaceId(id));
            }
            if let Some(bounds) = face.bounds {
                if bounds.width() < 0 || bounds.height() < 0 {
                    return Err(ValidationError::InvertedBounds { face: id });
                }
            }
        }

        Ok(())
    }
}

/// Validation errors for landmark frames
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Face id {0} appears more than once in the frame")]
    DuplicateFaceId(FaceId),

    #[error("Face {face} has a bounding box with negative width or height")]
    InvertedBounds { face: FaceId },
}
