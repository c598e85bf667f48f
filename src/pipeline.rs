//! Pipeline orchestration
//!
//! This module provides the public API for Emotion Flux.
//! It orchestrates one inference cycle per face: landmarks → feature
//! extraction → rule evaluation → temporal smoothing → score events.

use crate::config::EngineSettings;
use crate::detector::{Frame, LandmarkDetector};
use crate::error::InferenceError;
use crate::evaluator::RuleEvaluator;
use crate::features::{FeatureExtractor, FeatureVectorSpec};
use crate::rules::{parse_rule_text, RuleSet};
use crate::sink::ScoreSink;
use crate::smoother::TemporalSmoother;
use crate::types::{DetectedFace, EmotionScore, FaceId, LandmarkSet, ScoreEvent};
use std::collections::VecDeque;
use tracing::{debug, debug_span, warn};
use uuid::Uuid;

/// Score one face against a rule file without keeping any state.
///
/// Uses the shipped 68-point feature table and default settings. The result
/// is the raw, unsmoothed score of every emotion in the rule file.
///
/// # Example
/// ```ignore
/// let scores = score_landmarks(&std::fs::read_to_string("rules.txt")?, &landmarks)?;
/// println!("Happy: {}", scores["Happy"]);
/// ```
pub fn score_landmarks(
    rules_text: &str,
    landmarks: &LandmarkSet,
) -> Result<EmotionScore, InferenceError> {
    let mut engine = EmotionEngine::new();
    engine.load_rules(rules_text)?;
    engine.infer(landmarks)
}

/// Stateful engine holding the installed rules and per-face score histories.
///
/// Use this for continuous scoring of a video stream; one instance per
/// stream. An engine is not meant to be shared across threads without
/// external locking.
#[derive(Debug)]
pub struct EmotionEngine {
    id: Uuid,
    settings: EngineSettings,
    spec: FeatureVectorSpec,
    extractor: FeatureExtractor,
    evaluator: RuleEvaluator,
    rules: RuleSet,
    smoother: TemporalSmoother,
}

impl Default for EmotionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionEngine {
    /// Create an engine with default settings and the 68-point feature table
    pub fn new() -> Self {
        let settings = EngineSettings::default();
        Self {
            id: Uuid::new_v4(),
            settings,
            spec: FeatureVectorSpec::default_68(),
            extractor: FeatureExtractor::new(settings.clamp_cosines),
            evaluator: RuleEvaluator::new(settings.aggregation),
            rules: RuleSet::new(),
            smoother: TemporalSmoother::default(),
        }
    }

    /// Create an engine with specific settings
    pub fn with_settings(settings: EngineSettings) -> Result<Self, InferenceError> {
        settings.validate()?;
        Ok(Self {
            settings,
            extractor: FeatureExtractor::new(settings.clamp_cosines),
            evaluator: RuleEvaluator::new(settings.aggregation),
            smoother: TemporalSmoother::new(settings.smoothing())?,
            ..Self::new()
        })
    }

    /// Replace the feature table.
    ///
    /// Installed rules must still fit the new table; otherwise the engine is
    /// left unchanged. Histories are cleared since scores from the old table
    /// are not comparable.
    pub fn with_feature_spec(mut self, spec: FeatureVectorSpec) -> Result<Self, InferenceError> {
        check_rules_fit(&self.rules, &spec)?;
        self.spec = spec;
        self.smoother.clear();
        Ok(self)
    }

    /// Instance identifier used in log spans
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn feature_spec(&self) -> &FeatureVectorSpec {
        &self.spec
    }

    /// Parse rule text and install it.
    ///
    /// All-or-nothing: on a parse error or a rule that reads past the feature
    /// table, the previously installed rules stay in place.
    pub fn load_rules(&mut self, text: &str) -> Result<&RuleSet, InferenceError> {
        let rules = parse_rule_text(text)?;
        self.install_rules(rules)?;
        Ok(&self.rules)
    }

    /// Install an already parsed rule set, clearing all face histories
    pub fn install_rules(&mut self, rules: RuleSet) -> Result<(), InferenceError> {
        let _span = debug_span!("install_rules", engine = %self.id).entered();

        if let Err(e) = check_rules_fit(&rules, &self.spec) {
            warn!(error = %e, "rejecting rule set");
            return Err(e);
        }

        debug!(
            rules = rules.len(),
            emotions = ?rules.emotions(),
            "installed rule set"
        );
        self.rules = rules;
        self.smoother.clear();
        Ok(())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Emotion labels of the installed rules, first-seen order
    pub fn emotions(&self) -> &[String] {
        self.rules.emotions()
    }

    /// Raw score of one face; does not touch any history
    pub fn infer(&self, landmarks: &LandmarkSet) -> Result<EmotionScore, InferenceError> {
        let features = self.extractor.extract(landmarks, &self.spec)?;
        Ok(self.evaluator.evaluate(&features, &self.rules))
    }

    /// Run one full cycle for a face and emit the smoothed score of every
    /// known emotion to `sink`, in rule-file order.
    pub fn process_face(
        &mut self,
        face: FaceId,
        landmarks: &LandmarkSet,
        sink: &mut dyn ScoreSink,
    ) -> Result<(), InferenceError> {
        let score = self.infer(landmarks)?;
        self.commit(face, score, sink);
        Ok(())
    }

    /// Process every face of one frame as a unit.
    ///
    /// Faces without an id are keyed by their position in `faces`. Faces with
    /// no landmarks are skipped. Every face is scored before any history is
    /// touched, so on error no history moves and no event is emitted. Two
    /// faces resolving to the same id are rejected. Returns the number of
    /// faces processed.
    pub fn process_faces(
        &mut self,
        faces: &[DetectedFace],
        sink: &mut dyn ScoreSink,
    ) -> Result<usize, InferenceError> {
        let _span = debug_span!("process_faces", engine = %self.id, faces = faces.len()).entered();

        let mut scored: Vec<(FaceId, EmotionScore)> = Vec::with_capacity(faces.len());
        for (index, face) in faces.iter().enumerate() {
            let id = face.id.unwrap_or(index as FaceId);
            if face.landmarks.is_empty() {
                debug!(face = id, "skipping face without landmarks");
                continue;
            }
            if scored.iter().any(|(seen, _)| *seen == id) {
                return Err(InferenceError::Schema(format!(
                    "face id {id} appears twice in one frame"
                )));
            }
            scored.push((id, self.infer(&face.landmarks)?));
        }

        let processed = scored.len();
        for (id, score) in scored {
            self.commit(id, score, sink);
        }
        Ok(processed)
    }

    /// Detect faces in a frame and process them.
    ///
    /// The detector must produce enough landmarks for the feature table.
    pub fn process_frame(
        &mut self,
        detector: &mut dyn LandmarkDetector,
        frame: &Frame,
        sink: &mut dyn ScoreSink,
    ) -> Result<usize, InferenceError> {
        let needed = self.spec.max_index() + 1;
        if detector.landmark_count() < needed {
            return Err(InferenceError::InvalidFeatureSpec(format!(
                "feature table needs {needed} landmarks, detector yields {}",
                detector.landmark_count()
            )));
        }
        let faces = detector.detect(frame)?;
        self.process_faces(&faces, sink)
    }

    /// Record a raw score and announce the smoothed values
    fn commit(&mut self, face: FaceId, score: EmotionScore, sink: &mut dyn ScoreSink) {
        self.smoother.record(face, score);
        for emotion in self.rules.emotions() {
            sink.emit(ScoreEvent {
                emotion: emotion.clone(),
                face,
                value: self.smoother.average(face, emotion),
            });
        }
    }

    /// Smoothed score of one emotion for a face
    pub fn average(&self, face: FaceId, emotion: &str) -> f64 {
        self.smoother.average(face, emotion)
    }

    /// Stored raw scores for a face, oldest first
    pub fn history(&self, face: FaceId) -> Option<&VecDeque<EmotionScore>> {
        self.smoother.history(face)
    }

    /// Faces with history, ascending
    pub fn faces(&self) -> Vec<FaceId> {
        self.smoother.faces()
    }

    /// Forget every face
    pub fn reset(&mut self) {
        self.smoother.clear();
    }

    /// Forget one face; returns whether it had history
    pub fn clear_face(&mut self, face: FaceId) -> bool {
        self.smoother.clear_face(face)
    }

    /// Load face histories from JSON.
    ///
    /// The stored smoothing parameters must match this engine's settings.
    pub fn load_history(&mut self, json: &str) -> Result<(), InferenceError> {
        let smoother = TemporalSmoother::from_json(json)?;
        if *smoother.config() != self.settings.smoothing() {
            return Err(InferenceError::InvalidConfig(format!(
                "history was recorded with {:?}, engine uses {:?}",
                smoother.config(),
                self.settings.smoothing()
            )));
        }
        self.smoother = smoother;
        Ok(())
    }

    /// Save face histories to JSON
    pub fn save_history(&self) -> Result<String, InferenceError> {
        self.smoother.to_json()
    }
}

fn check_rules_fit(rules: &RuleSet, spec: &FeatureVectorSpec) -> Result<(), InferenceError> {
    match rules.max_variable() {
        Some(max) if max >= spec.feature_count() => Err(InferenceError::InvalidRuleSet(format!(
            "rule reads V{max} but the feature table yields {} features",
            spec.feature_count()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Aggregation;
    use crate::detector::ReplayDetector;
    use crate::types::Point;
    use pretty_assertions::assert_eq;

    const SAMPLE_RULES: &str = include_str!("../data/sample_rules.txt");

    /// Deterministic 68-point face shifted by `offset`
    fn landmarks(offset: i32) -> LandmarkSet {
        (0..68)
            .map(|i: i32| {
                let angle = i as f64 * 0.37;
                (
                    200 + (80.0 * angle.cos()) as i32 + (i % 7) * 3 + offset,
                    200 + (95.0 * angle.sin()) as i32 + (i % 5) * 4,
                )
            })
            .collect()
    }

    fn engine() -> EmotionEngine {
        let mut engine = EmotionEngine::new();
        engine.load_rules(SAMPLE_RULES).unwrap();
        engine
    }

    #[test]
    fn test_score_landmarks_reports_every_emotion() {
        let scores = score_landmarks(SAMPLE_RULES, &landmarks(0)).unwrap();
        let mut keys: Vec<&String> = scores.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["Happy", "Neutral", "Sad", "Surprise"]);
        assert!(scores.values().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_process_face_emits_one_event_per_emotion() {
        let mut engine = engine();
        let mut events: Vec<ScoreEvent> = Vec::new();

        engine.process_face(7, &landmarks(0), &mut events).unwrap();

        let emitted: Vec<&str> = events.iter().map(|e| e.emotion.as_str()).collect();
        assert_eq!(emitted, vec!["Happy", "Sad", "Surprise", "Neutral"]);
        assert!(events.iter().all(|e| e.face == 7));

        let raw = engine.infer(&landmarks(0)).unwrap();
        for event in &events {
            assert!((event.value - raw[&event.emotion]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_smoothed_value_is_window_mean() {
        let settings = EngineSettings {
            average: 2,
            ..EngineSettings::default()
        };
        let mut engine = EmotionEngine::with_settings(settings).unwrap();
        engine.load_rules(SAMPLE_RULES).unwrap();

        let a = engine.infer(&landmarks(0)).unwrap();
        let b = engine.infer(&landmarks(9)).unwrap();
        let mut sink = crate::sink::NullSink;
        engine.process_face(0, &landmarks(0), &mut sink).unwrap();
        engine.process_face(0, &landmarks(9), &mut sink).unwrap();

        for emotion in engine.emotions() {
            let expected = (a[emotion] + b[emotion]) / 2.0;
            assert!((engine.average(0, emotion) - expected).abs() < 1e-12);
        }
        assert_eq!(engine.history(0).map(|h| h.len()), Some(2));
    }

    #[test]
    fn test_process_faces_defaults_ids_to_detection_order() {
        let mut engine = engine();
        let faces = vec![
            DetectedFace::new(landmarks(0)),
            DetectedFace::new(LandmarkSet::default()),
            DetectedFace::new(landmarks(3)).with_id(42),
        ];
        let mut events: Vec<ScoreEvent> = Vec::new();

        let processed = engine.process_faces(&faces, &mut events).unwrap();

        assert_eq!(processed, 2);
        assert_eq!(engine.faces(), vec![0, 42]);
        assert_eq!(events.len(), 2 * engine.emotions().len());
    }

    #[test]
    fn test_failing_face_leaves_frame_uncommitted() {
        let mut engine = engine();
        let short: LandmarkSet = landmarks(0).points()[..30].to_vec().into();
        let faces = vec![
            DetectedFace::new(landmarks(0)).with_id(0),
            DetectedFace::new(short).with_id(1),
        ];
        let mut events: Vec<ScoreEvent> = Vec::new();

        let err = engine.process_faces(&faces, &mut events).unwrap_err();

        assert!(matches!(err, InferenceError::IndexOutOfRange { landmarks: 30, .. }));
        assert!(engine.faces().is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_colliding_face_ids_are_rejected() {
        let mut engine = engine();
        let faces = vec![
            DetectedFace::new(landmarks(0)),
            DetectedFace::new(landmarks(3)).with_id(0),
        ];
        let mut events: Vec<ScoreEvent> = Vec::new();

        let err = engine.process_faces(&faces, &mut events).unwrap_err();

        assert!(matches!(err, InferenceError::Schema(_)));
        assert!(engine.faces().is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_detector_must_cover_feature_table() {
        struct FivePoint;

        impl LandmarkDetector for FivePoint {
            fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedFace>, InferenceError> {
                Ok(vec![DetectedFace::new(landmarks(0))])
            }

            fn landmark_count(&self) -> usize {
                5
            }
        }

        let mut engine = engine();
        let mut events: Vec<ScoreEvent> = Vec::new();
        let err = engine
            .process_frame(&mut FivePoint, &Frame::default(), &mut events)
            .unwrap_err();

        assert!(matches!(err, InferenceError::InvalidFeatureSpec(_)));
        assert!(events.is_empty());
    }

    #[test]
    fn test_process_frame_through_detector() {
        let mut engine = engine();
        let mut detector = ReplayDetector::new([vec![DetectedFace::new(landmarks(0))], vec![]]);
        let mut count = 0;
        let mut sink = |_: ScoreEvent| count += 1;

        let frame = Frame::default();
        assert_eq!(engine.process_frame(&mut detector, &frame, &mut sink).unwrap(), 1);
        assert_eq!(engine.process_frame(&mut detector, &frame, &mut sink).unwrap(), 0);
        drop(sink);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_too_few_landmarks_is_index_error() {
        let mut engine = engine();
        let short: LandmarkSet = landmarks(0).points()[..30].to_vec().into();
        let err = engine
            .process_face(0, &short, &mut crate::sink::NullSink)
            .unwrap_err();
        assert!(matches!(err, InferenceError::IndexOutOfRange { landmarks: 30, .. }));
        assert!(engine.faces().is_empty());
    }

    #[test]
    fn test_failed_load_keeps_previous_rules() {
        let mut engine = engine();
        engine.process_face(0, &landmarks(0), &mut crate::sink::NullSink).unwrap();

        let broken = "(V1 in [0, 1, inf, inf]) => Emotions=Joy (CF = 0.5)\n(V2 in [oops]) => Emotions=Joy (CF = 0.5)";
        assert!(engine.load_rules(broken).is_err());
        assert_eq!(engine.rules().len(), 8);
        assert_eq!(engine.faces(), vec![0]);
    }

    #[test]
    fn test_rules_beyond_feature_table_are_rejected() {
        let mut engine = engine();
        let err = engine
            .load_rules("(V54 in [0, 1, inf, inf]) => Emotions=Joy (CF = 0.5)")
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidRuleSet(_)));
        assert_eq!(engine.emotions(), ["Happy", "Sad", "Surprise", "Neutral"]);
    }

    #[test]
    fn test_installing_rules_clears_history() {
        let mut engine = engine();
        engine.process_face(0, &landmarks(0), &mut crate::sink::NullSink).unwrap();
        engine
            .load_rules("(V0 in [-inf, -inf, 90, 180]) => Emotions=Calm (CF = 1.0)")
            .unwrap();
        assert!(engine.faces().is_empty());
        assert_eq!(engine.emotions(), ["Calm"]);
    }

    #[test]
    fn test_feature_spec_must_cover_rules() {
        let small = FeatureVectorSpec::new(vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        assert!(engine().with_feature_spec(small.clone()).is_err());

        let mut engine = EmotionEngine::new().with_feature_spec(small).unwrap();
        engine
            .load_rules("(V2 in [0, 10, 170, 180]) => Emotions=Any (CF = 1.0)")
            .unwrap();
        let triangle: LandmarkSet = vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)].into();
        let score = engine.infer(&triangle).unwrap();
        assert!((score["Any"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_round_trip() {
        let mut engine = engine();
        let mut sink = crate::sink::NullSink;
        for offset in 0..3 {
            engine.process_face(1, &landmarks(offset), &mut sink).unwrap();
        }
        let json = engine.save_history().unwrap();

        let mut restored = self::engine();
        restored.load_history(&json).unwrap();
        assert_eq!(restored.faces(), vec![1]);
        assert_eq!(restored.average(1, "Happy"), engine.average(1, "Happy"));

        let settings = EngineSettings {
            average: 9,
            ..EngineSettings::default()
        };
        let mut other = EmotionEngine::with_settings(settings).unwrap();
        assert!(matches!(
            other.load_history(&json),
            Err(InferenceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_classic_aggregation_bounds_scores() {
        let settings = EngineSettings {
            aggregation: Aggregation::Classic,
            ..EngineSettings::default()
        };
        let mut engine = EmotionEngine::with_settings(settings).unwrap();
        engine.load_rules(SAMPLE_RULES).unwrap();
        let scores = engine.infer(&landmarks(0)).unwrap();
        assert!(scores.values().all(|v| (0.0..=1.0).contains(v)));
    }
}
