//! Emotion Flux - Fuzzy-rule emotion inference from facial landmarks
//!
//! Flux turns the 2-D landmark points of detected faces into per-emotion
//! certainty scores through a deterministic pipeline: triangle feature
//! extraction → FURIA rule evaluation → temporal smoothing → score events.
//!
//! ## Modules
//!
//! - **Inference core**: `features`, `rules`, `evaluator`, `smoother`
//! - **Engine**: `pipeline` wires the core to a `detector` and a `sink`
//! - **Interop**: `schema` (landmark frame records), `ffi` (C ABI)

pub mod config;
pub mod detector;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod pipeline;
pub mod rules;
pub mod schema;
pub mod sink;
pub mod smoother;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{Aggregation, EngineSettings, SmoothingConfig};
pub use detector::{Frame, LandmarkDetector, ReplayDetector};
pub use error::InferenceError;
pub use evaluator::RuleEvaluator;
pub use features::{FeatureExtractor, FeatureVectorSpec};
pub use pipeline::{score_landmarks, EmotionEngine};
pub use rules::{parse_rule, parse_rules, FuzzyRule, FuzzyTerm, RuleSet};
pub use sink::ScoreSink;
pub use smoother::TemporalSmoother;
pub use types::{DetectedFace, EmotionScore, FaceId, LandmarkSet, Point, ScoreEvent};

// Schema exports
pub use schema::{LandmarkFrame, LandmarkFrameAdapter, SCHEMA_VERSION};

/// Library version reported by the CLI and the C ABI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by `eflux doctor`
pub const PRODUCER_NAME: &str = "emotion-flux";
