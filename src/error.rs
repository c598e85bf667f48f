//! Error types for Emotion Flux

use thiserror::Error;

/// Errors that can occur while parsing rules or scoring faces
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Rule parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Landmark index {index} out of range for {landmarks} landmarks")]
    IndexOutOfRange { index: usize, landmarks: usize },

    #[error("Invalid feature vector spec: {0}")]
    InvalidFeatureSpec(String),

    #[error("Invalid rule set: {0}")]
    InvalidRuleSet(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Landmark detector failure: {0}")]
    Detector(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid landmark frame: {0}")]
    Schema(String),
}

impl InferenceError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        InferenceError::Parse {
            line,
            message: message.into(),
        }
    }
}
