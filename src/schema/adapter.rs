//! Reader for face.landmark_frame.v1 records
//!
//! Landmark dumps arrive either as a JSON array of frames or as NDJSON with
//! one frame per line.

use crate::error::InferenceError;
use crate::schema::landmark_frame::{LandmarkFrame, ValidationError};

/// Adapter for reading landmark frames
pub struct LandmarkFrameAdapter;

impl LandmarkFrameAdapter {
    /// Parse a JSON string containing an array of frames
    pub fn parse_array(json: &str) -> Result<Vec<LandmarkFrame>, InferenceError> {
        let frames: Vec<LandmarkFrame> = serde_json::from_str(json)?;
        Ok(frames)
    }

    /// Parse NDJSON (newline-delimited JSON) containing frames
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<LandmarkFrame>, InferenceError> {
        ndjson
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_num, line)| Self::parse_line(line, line_num + 1))
            .collect()
    }

    /// Parse one NDJSON line; `line_no` is only used in the error message
    pub fn parse_line(line: &str, line_no: usize) -> Result<LandmarkFrame, InferenceError> {
        serde_json::from_str::<LandmarkFrame>(line.trim()).map_err(|e| {
            InferenceError::Schema(format!("Failed to parse line {line_no}: {e}"))
        })
    }

    /// Validate a batch of frames, returning only the failures
    pub fn validate_frames(frames: &[LandmarkFrame]) -> Vec<ValidationResult> {
        frames
            .iter()
            .enumerate()
            .filter_map(|(idx, frame)| {
                frame.validate().err().map(|error| ValidationResult {
                    index: idx,
                    frame: frame.frame,
                    error,
                })
            })
            .collect()
    }
}

/// Result of frame validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Position of the frame in the batch
    pub index: usize,
    /// Frame sequence number, when the record carries one
    pub frame: Option<u64>,
    pub error: ValidationError,
}
