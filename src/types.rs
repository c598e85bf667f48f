//! Core types for the Emotion Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark points, feature vectors, raw emotion scores and the
//! score events handed to the output sink.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Index;

/// Caller-assigned, stable identifier of a face across frames
pub type FaceId = u32;

/// Ordered angles (degrees) derived from a landmark set; rules read it as `V<index>`
pub type FeatureVector = Vec<f64>;

/// Raw or smoothed score per emotion label for one face
pub type EmotionScore = HashMap<String, f64>;

/// A 2-D landmark point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Face region reported by a detector, edges in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Ordered landmark points of one detected face.
///
/// Index semantics are fixed by the landmark model that produced the points
/// (for the common 68-point model, index 36 is the left-eye outer corner).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet(Vec<Point>);

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.0.get(index)
    }

    pub fn points(&self) -> &[Point] {
        &self.0
    }
}

impl From<Vec<Point>> for LandmarkSet {
    fn from(points: Vec<Point>) -> Self {
        Self(points)
    }
}

impl FromIterator<(i32, i32)> for LandmarkSet {
    fn from_iter<T: IntoIterator<Item = (i32, i32)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }
}

impl Index<usize> for LandmarkSet {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// A face found in one frame, as handed over by a landmark detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Stable identity; detection order is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FaceId>,
    /// Region the detector located the face in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// Ordered landmark points
    pub landmarks: LandmarkSet,
}

impl DetectedFace {
    pub fn new(landmarks: LandmarkSet) -> Self {
        Self {
            id: None,
            bounds: None,
            landmarks,
        }
    }

    pub fn with_id(mut self, id: FaceId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// Smoothed score announcement, one per emotion per processed face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    /// Emotion label as written in the rule file
    pub emotion: String,
    /// Face the score belongs to
    pub face: FaceId,
    /// Moving-average certainty (unbounded, not a probability)
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0, 0);
        let b = Point::new(3, 4);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        assert!((b.distance(&a) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_landmark_set_serializes_as_array() {
        let set: LandmarkSet = vec![(1, 2), (3, 4)].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"x":1,"y":2},{"x":3,"y":4}]"#);

        let back: LandmarkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1], Point::new(3, 4));
    }

    #[test]
    fn test_detected_face_optional_fields() {
        let face: DetectedFace =
            serde_json::from_str(r#"{"landmarks": [{"x": 0, "y": 0}]}"#).unwrap();
        assert!(face.id.is_none());
        assert!(face.bounds.is_none());

        let face = face.with_id(7).with_bounds(BoundingBox::new(0, 0, 10, 20));
        assert_eq!(face.id, Some(7));
        assert_eq!(face.bounds.unwrap().height(), 20);
    }
}
