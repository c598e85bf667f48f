//! Landmark detector capability
//!
//! Face detection and landmark localisation live outside this crate. Hosts
//! plug their detector in through [`LandmarkDetector`]; the engine only needs
//! the ordered landmark points of each face found in a frame.

use crate::error::InferenceError;
use crate::types::DetectedFace;
use std::collections::VecDeque;

/// Raw pixel data of one frame, layout owned by the detector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Locates faces and their landmarks in a frame
pub trait LandmarkDetector {
    /// Zero or more faces found in the frame, each with ordered landmarks
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError>;

    /// Number of landmarks the underlying model produces per face
    fn landmark_count(&self) -> usize {
        68
    }
}

impl<F> LandmarkDetector for F
where
    F: FnMut(&Frame) -> Result<Vec<DetectedFace>, InferenceError>,
{
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError> {
        self(frame)
    }
}

/// Detector that replays pre-recorded landmark results, one batch per frame.
///
/// Used for offline scoring of landmark dumps and for testing without a
/// native detector. Frames past the end of the recording yield no faces.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    batches: VecDeque<Vec<DetectedFace>>,
}

impl ReplayDetector {
    pub fn new<I>(batches: I) -> Self
    where
        I: IntoIterator<Item = Vec<DetectedFace>>,
    {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    /// Queue another frame's worth of faces
    pub fn push(&mut self, faces: Vec<DetectedFace>) {
        self.batches.push_back(faces);
    }

    /// Frames still queued
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl LandmarkDetector for ReplayDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}
