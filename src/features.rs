//! Feature extraction
//!
//! This module turns a landmark set into the ordered angle vector the fuzzy
//! rules read:
//! - Euclidean side lengths for every configured landmark pair
//! - Law-of-cosines for each triangle (three consecutive pairs)
//! - Arc cosine in degrees
//!
//! The output order is rotation order `(s0,s1,s2)`, `(s1,s2,s0)`, `(s2,s0,s1)`
//! per triangle, triangles in table order. Rule variables `V<n>` index into it.

use crate::error::InferenceError;
use crate::types::{FeatureVector, LandmarkSet, Point};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Landmark pairs shipped with the 68-point FURIA rule sets (18 triangles).
///
/// Some pairs repeat on purpose: a triangle may share a side with an earlier one.
pub const DEFAULT_68_POINT_PAIRS: [(usize, usize); 54] = [
    // left eyebrow to left eye
    (17, 36),
    (17, 39),
    (36, 39),
    (19, 36),
    (19, 39),
    (36, 39),
    (21, 36),
    (21, 39),
    (36, 39),
    // right eyebrow to right eye
    (22, 42),
    (22, 45),
    (42, 45),
    (24, 42),
    (24, 45),
    (24, 45),
    (26, 42),
    (26, 45),
    (24, 45),
    // left eyelids
    (37, 40),
    (37, 41),
    (40, 41),
    (38, 40),
    (38, 41),
    (40, 41),
    // right eyelids
    (43, 46),
    (43, 47),
    (46, 47),
    (44, 46),
    (44, 47),
    (46, 47),
    // mouth
    (48, 51),
    (51, 54),
    (48, 54),
    (48, 57),
    (54, 57),
    (48, 54),
    // eyebrow arches
    (17, 19),
    (19, 21),
    (17, 21),
    (22, 24),
    (24, 26),
    (22, 26),
    // brow gap to nose bridge
    (21, 27),
    (22, 27),
    (21, 22),
    // eye corners to mouth
    (36, 60),
    (48, 60),
    (36, 48),
    (45, 64),
    (54, 64),
    (45, 54),
    (39, 51),
    (42, 51),
    (39, 42),
];

/// Ordered landmark index pairs, grouped in runs of three (one triangle each)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(usize, usize)>", into = "Vec<(usize, usize)>")]
pub struct FeatureVectorSpec {
    pairs: Vec<(usize, usize)>,
}

impl FeatureVectorSpec {
    /// Create a feature table; the pair count must be a non-zero multiple of 3
    pub fn new(pairs: Vec<(usize, usize)>) -> Result<Self, InferenceError> {
        if pairs.is_empty() || pairs.len() % 3 != 0 {
            return Err(InferenceError::InvalidFeatureSpec(format!(
                "expected a non-zero multiple of 3 landmark pairs, got {}",
                pairs.len()
            )));
        }
        Ok(Self { pairs })
    }

    /// The table shipped for 68-point landmark models
    pub fn default_68() -> Self {
        Self {
            pairs: DEFAULT_68_POINT_PAIRS.to_vec(),
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Number of triangles described by the table
    pub fn triangle_count(&self) -> usize {
        self.pairs.len() / 3
    }

    /// Length of the feature vector this table produces
    pub fn feature_count(&self) -> usize {
        self.pairs.len()
    }

    /// Highest landmark index referenced
    pub fn max_index(&self) -> usize {
        self.pairs
            .iter()
            .map(|&(a, b)| a.max(b))
            .max()
            .unwrap_or(0)
    }
}

impl Default for FeatureVectorSpec {
    fn default() -> Self {
        Self::default_68()
    }
}

impl TryFrom<Vec<(usize, usize)>> for FeatureVectorSpec {
    type Error = InferenceError;

    fn try_from(pairs: Vec<(usize, usize)>) -> Result<Self, Self::Error> {
        Self::new(pairs)
    }
}

impl From<FeatureVectorSpec> for Vec<(usize, usize)> {
    fn from(spec: FeatureVectorSpec) -> Self {
        spec.pairs
    }
}

/// Feature extractor for computing triangle angles from landmarks
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    clamp_cosines: bool,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FeatureExtractor {
    /// Create an extractor. With `clamp_cosines` off, degenerate triangles
    /// yield NaN angles exactly as an unclamped arc cosine would.
    pub fn new(clamp_cosines: bool) -> Self {
        Self { clamp_cosines }
    }

    /// Extract the feature vector of one face
    pub fn extract(
        &self,
        landmarks: &LandmarkSet,
        spec: &FeatureVectorSpec,
    ) -> Result<FeatureVector, InferenceError> {
        let sides = side_lengths(landmarks, spec)?;

        let mut features = Vec::with_capacity(sides.len());
        for triangle in sides.chunks_exact(3) {
            let (s0, s1, s2) = (triangle[0], triangle[1], triangle[2]);
            for (a, b, c) in [(s0, s1, s2), (s1, s2, s0), (s2, s0, s1)] {
                let cos = cosine(a, b, c);
                let cos = if self.clamp_cosines {
                    clamp_cosine(cos)
                } else {
                    cos
                };
                features.push(arc_cosine_degrees(cos));
            }
        }

        Ok(features)
    }
}

/// Extract features with cosine clamping enabled
pub fn extract(
    landmarks: &LandmarkSet,
    spec: &FeatureVectorSpec,
) -> Result<FeatureVector, InferenceError> {
    FeatureExtractor::default().extract(landmarks, spec)
}

/// Side length for every pair in the spec, in table order
fn side_lengths(
    landmarks: &LandmarkSet,
    spec: &FeatureVectorSpec,
) -> Result<Vec<f64>, InferenceError> {
    spec.pairs()
        .iter()
        .map(|&(a, b)| {
            let pa = landmark(landmarks, a)?;
            let pb = landmark(landmarks, b)?;
            Ok(pa.distance(pb))
        })
        .collect()
}

fn landmark(landmarks: &LandmarkSet, index: usize) -> Result<&Point, InferenceError> {
    landmarks
        .get(index)
        .ok_or(InferenceError::IndexOutOfRange {
            index,
            landmarks: landmarks.len(),
        })
}

/// Law of cosines: cosine of the angle opposite side `c`
fn cosine(a: f64, b: f64, c: f64) -> f64 {
    (a * a + b * b - c * c) / (2.0 * a * b)
}

/// Bring a cosine back into the arc cosine domain.
///
/// 0/0 (coincident landmarks) has no direction; it maps to 1.0, the
/// collinear limit.
fn clamp_cosine(cos: f64) -> f64 {
    if cos.is_nan() {
        trace!("undefined cosine from coincident landmarks, using 1.0");
        return 1.0;
    }
    if !(-1.0..=1.0).contains(&cos) {
        trace!(cos, "cosine outside [-1, 1], clamping");
    }
    cos.clamp(-1.0, 1.0)
}

fn arc_cosine_degrees(cos: f64) -> f64 {
    cos.acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equilateral() -> LandmarkSet {
        // Side ~100 px; integer rounding keeps angles within a fraction of a degree
        LandmarkSet::new(vec![Point::new(0, 0), Point::new(100, 0), Point::new(50, 87)])
    }

    #[test]
    fn test_equilateral_triangle_angles() {
        let spec = FeatureVectorSpec::new(vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        let features = extract(&equilateral(), &spec).unwrap();

        assert_eq!(features.len(), 3);
        for angle in &features {
            assert!((angle - 60.0).abs() < 0.5, "angle {angle} not ~60");
            assert!((angle.to_radians().cos() - 0.5).abs() < 0.01);
        }
        let sum: f64 = features.iter().sum();
        assert!((sum - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_right_triangle_rotation_order() {
        // Sides: s0 = |p0p1| = 3, s1 = |p1p2| = 5, s2 = |p2p0| = 4
        let landmarks = LandmarkSet::new(vec![Point::new(0, 0), Point::new(3, 0), Point::new(0, 4)]);
        let spec = FeatureVectorSpec::new(vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        let features = extract(&landmarks, &spec).unwrap();

        // (3,5,4): angle opposite 4; (5,4,3): opposite 3; (4,3,5): opposite 5
        assert!((features[0] - (3.0f64 / 5.0).acos().to_degrees()).abs() < 1e-9);
        assert!((features[1] - (4.0f64 / 5.0).acos().to_degrees()).abs() < 1e-9);
        assert!((features[2] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_index_out_of_range() {
        let landmarks = LandmarkSet::new(vec![Point::new(0, 0), Point::new(1, 1)]);
        let spec = FeatureVectorSpec::new(vec![(0, 1), (1, 5), (5, 0)]).unwrap();

        match extract(&landmarks, &spec) {
            Err(InferenceError::IndexOutOfRange { index, landmarks }) => {
                assert_eq!(index, 5);
                assert_eq!(landmarks, 2);
            }
            other => panic!("expected IndexOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_spec_requires_triangles() {
        assert!(FeatureVectorSpec::new(vec![(0, 1), (1, 2)]).is_err());
        assert!(FeatureVectorSpec::new(vec![]).is_err());
        assert!(serde_json::from_str::<FeatureVectorSpec>("[[0,1],[1,2]]").is_err());
        let spec: FeatureVectorSpec = serde_json::from_str("[[0,1],[1,2],[2,0]]").unwrap();
        assert_eq!(spec.triangle_count(), 1);
    }

    #[test]
    fn test_default_table() {
        let spec = FeatureVectorSpec::default_68();
        assert_eq!(spec.pairs().len(), 54);
        assert_eq!(spec.triangle_count(), 18);
        assert_eq!(spec.feature_count(), 54);
        assert_eq!(spec.max_index(), 64);
    }

    #[test]
    fn test_degenerate_triangle_is_clamped() {
        // Two coincident points: one side has zero length
        let landmarks = LandmarkSet::new(vec![Point::new(0, 0), Point::new(0, 0), Point::new(10, 0)]);
        let spec = FeatureVectorSpec::new(vec![(0, 1), (1, 2), (2, 0)]).unwrap();

        let clamped = FeatureExtractor::new(true).extract(&landmarks, &spec).unwrap();
        assert!(clamped.iter().all(|v| v.is_finite()));

        let raw = FeatureExtractor::new(false).extract(&landmarks, &spec).unwrap();
        assert!(raw.iter().any(|v| v.is_nan()));
    }

    #[test]
    fn test_collinear_points_give_flat_angles() {
        let landmarks = LandmarkSet::new(vec![Point::new(0, 0), Point::new(5, 0), Point::new(10, 0)]);
        let spec = FeatureVectorSpec::new(vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        let features = extract(&landmarks, &spec).unwrap();

        assert!(features.iter().all(|v| v.is_finite()));
        assert!(features.iter().any(|v| (v - 180.0).abs() < 1e-6));
    }
}
