//! Fuzzy rule evaluation
//!
//! Scores one face's feature vector against a rule set:
//! - term membership from the trapezoid of each term
//! - AND across a rule's terms
//! - OR across the rules voting for the same emotion
//!
//! With the default weighted-sum aggregation the result is an unbounded
//! certainty signal, not a probability.

use crate::config::Aggregation;
use crate::rules::{FuzzyRule, RuleSet};
use crate::types::EmotionScore;

/// Rule evaluator for computing raw per-emotion scores
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator {
    aggregation: Aggregation,
}

impl RuleEvaluator {
    pub fn new(aggregation: Aggregation) -> Self {
        Self { aggregation }
    }

    /// Score every emotion known to the rule set, zero included
    pub fn evaluate(&self, features: &[f64], rules: &RuleSet) -> EmotionScore {
        let mut scores: EmotionScore = rules
            .emotions()
            .iter()
            .map(|emotion| (emotion.clone(), 0.0))
            .collect();

        for rule in rules.rules() {
            let weighted = rule.cf() * self.conjunction(rule, features);
            if let Some(score) = scores.get_mut(rule.emotion()) {
                *score = match self.aggregation {
                    Aggregation::WeightedSum => *score + weighted,
                    Aggregation::Classic => nan_max(*score, weighted),
                };
            }
        }

        scores
    }

    /// AND over the rule's terms, seeded with the first term's membership
    fn conjunction(&self, rule: &FuzzyRule, features: &[f64]) -> f64 {
        rule.terms()
            .iter()
            .map(|term| term.membership(feature(features, term.variable)))
            .reduce(|acc, m| match self.aggregation {
                Aggregation::WeightedSum => acc * m,
                Aggregation::Classic => nan_min(acc, m),
            })
            .unwrap_or(0.0)
    }
}

/// Evaluate with the default weighted-sum aggregation
pub fn evaluate(features: &[f64], rules: &RuleSet) -> EmotionScore {
    RuleEvaluator::default().evaluate(features, rules)
}

// f64::min and f64::max discard NaN; these keep it
fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Missing slots read as NaN so they surface in the score instead of panicking
fn feature(features: &[f64], index: usize) -> f64 {
    features.get(index).copied().unwrap_or(f64::NAN)
}
