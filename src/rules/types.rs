//! Fuzzy rule model
//!
//! A rule is a conjunction of trapezoidal terms over feature-vector slots,
//! weighted by a certainty factor and labelled with the emotion it supports.

use crate::error::InferenceError;
use std::fmt;

/// Trapezoidal membership function over one feature-vector slot.
///
/// Breakpoints are expected to satisfy `lsb <= lst <= rst <= rsb`; shoulders may
/// be infinite. Out-of-order breakpoints are kept as parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyTerm {
    /// Zero-based feature index (`V<n>`)
    pub variable: usize,
    /// Left shoulder bottom
    pub lsb: f64,
    /// Left shoulder top
    pub lst: f64,
    /// Right shoulder top
    pub rst: f64,
    /// Right shoulder bottom
    pub rsb: f64,
}

impl FuzzyTerm {
    pub fn new(variable: usize, lsb: f64, lst: f64, rst: f64, rsb: f64) -> Self {
        Self {
            variable,
            lsb,
            lst,
            rst,
            rsb,
        }
    }

    /// Degree to which `value` belongs to this term.
    ///
    /// NaN input yields NaN so a broken feature stays visible in the score.
    pub fn membership(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        if value < self.lsb || value > self.rsb {
            0.0
        } else if value < self.lst {
            // rising edge; an infinite left shoulder has no slope
            if self.lsb.is_infinite() {
                1.0
            } else {
                (value - self.lsb) / (self.lst - self.lsb)
            }
        } else if value <= self.rst {
            1.0
        } else if self.rsb.is_infinite() {
            1.0
        } else {
            (self.rsb - value) / (self.rsb - self.rst)
        }
    }

    /// Whether the breakpoints are ordered `lsb <= lst <= rst <= rsb`
    pub fn is_well_formed(&self) -> bool {
        self.lsb <= self.lst && self.lst <= self.rst && self.rst <= self.rsb
    }
}

impl fmt::Display for FuzzyTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(V{} in [{}, {}, {}, {}])",
            self.variable,
            Bound(self.lsb),
            Bound(self.lst),
            Bound(self.rst),
            Bound(self.rsb)
        )
    }
}

/// Renders infinities the way rule files spell them
struct Bound(f64);

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == f64::NEG_INFINITY {
            f.write_str("-inf")
        } else if self.0 == f64::INFINITY {
            f.write_str("inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Conjunction of terms supporting one emotion with a certainty factor
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyRule {
    terms: Vec<FuzzyTerm>,
    emotion: String,
    cf: f64,
}

impl FuzzyRule {
    /// Create a rule; at least one term is required
    pub fn new(
        terms: Vec<FuzzyTerm>,
        emotion: impl Into<String>,
        cf: f64,
    ) -> Result<Self, InferenceError> {
        let emotion = emotion.into();
        if terms.is_empty() {
            return Err(InferenceError::InvalidRuleSet(format!(
                "rule for {emotion} has no terms"
            )));
        }
        Ok(Self { terms, emotion, cf })
    }

    pub fn terms(&self) -> &[FuzzyTerm] {
        &self.terms
    }

    pub fn emotion(&self) -> &str {
        &self.emotion
    }

    /// Certainty factor in (0, 1]
    pub fn cf(&self) -> f64 {
        self.cf
    }

    /// Highest feature index the rule reads
    pub fn max_variable(&self) -> usize {
        self.terms.iter().map(|t| t.variable).max().unwrap_or(0)
    }
}

impl fmt::Display for FuzzyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, " => Emotions={} (CF = {})", self.emotion, self.cf)
    }
}

/// Ordered rules plus the distinct emotion labels in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<FuzzyRule>,
    emotions: Vec<String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, registering its emotion label if unseen
    pub fn push(&mut self, rule: FuzzyRule) {
        if !self.emotions.iter().any(|e| e == rule.emotion()) {
            self.emotions.push(rule.emotion().to_string());
        }
        self.rules.push(rule);
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.emotions.clear();
    }

    pub fn rules(&self) -> &[FuzzyRule] {
        &self.rules
    }

    /// Distinct emotion labels, first-seen order
    pub fn emotions(&self) -> &[String] {
        &self.emotions
    }

    /// Rules voting for one emotion
    pub fn rules_for<'a>(&'a self, emotion: &'a str) -> impl Iterator<Item = &'a FuzzyRule> + 'a {
        self.rules.iter().filter(move |r| r.emotion() == emotion)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Highest feature index any rule reads, `None` when empty
    pub fn max_variable(&self) -> Option<usize> {
        self.rules.iter().map(FuzzyRule::max_variable).max()
    }
}

impl FromIterator<FuzzyRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = FuzzyRule>>(iter: T) -> Self {
        let mut set = RuleSet::new();
        for rule in iter {
            set.push(rule);
        }
        set
    }
}
