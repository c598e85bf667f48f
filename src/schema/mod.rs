//! face.landmark_frame.v1 input schema
//!
//! This module defines the detector-agnostic input records used to feed
//! landmark dumps through the engine offline (CLI, FFI, replay).

mod adapter;
mod landmark_frame;

pub use adapter::*;
pub use landmark_frame::*;
