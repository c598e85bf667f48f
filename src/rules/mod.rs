//! Fuzzy rule language
//!
//! Rule files are produced offline by FURIA and contain one rule per line:
//!
//! ```text
//! (V30 in [159.608, 160.424, inf, inf]) and (V35 in [30.0655, 30.2536, inf, inf]) => Emotions=Happy (CF = 0.97)
//! ```
//!
//! Pipeline: rule text → lexer → parser → RuleSet

mod lexer;
pub mod parser;
pub mod types;

pub use parser::{parse_rule, parse_rule_text, parse_rules};
pub use types::{FuzzyRule, FuzzyTerm, RuleSet};
