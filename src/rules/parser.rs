//! Recursive-descent parser for FURIA rule lines
//!
//! ```text
//! rule        := conjunction "=>" consequent
//! conjunction := term ("and" term)*
//! term        := "(" "V"INT "in" "[" bound "," bound "," bound "," bound "]" ")"
//! bound       := SIGNED_FLOAT | "inf" | "-inf"
//! consequent  := "Emotions" "=" IDENT "(" "CF" "=" FLOAT ")"
//! ```

use super::lexer::{tokenize, Token, TokenKind};
use super::types::{FuzzyRule, FuzzyTerm, RuleSet};
use crate::error::InferenceError;
use tracing::{debug, warn};

/// Only lines with this prefix are treated as rules that must parse
const RULE_PREFIX: &str = "(V";

/// Parse a single rule line
pub fn parse_rule(line: &str) -> Result<FuzzyRule, InferenceError> {
    parse_line(line, 1)
}

/// Parse a rule corpus line by line into a fresh rule set.
///
/// Blank lines and lines not starting with `(V` that fail to parse (headers,
/// separators, rule counts) are skipped. A `(V` line that fails to parse fails
/// the whole call; nothing is returned for the lines parsed before it.
pub fn parse_rules<I, S>(lines: I) -> Result<RuleSet, InferenceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = RuleSet::new();

    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let line_no = idx + 1;

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(line, line_no) {
            Ok(rule) => set.push(rule),
            Err(e) if line.starts_with(RULE_PREFIX) => {
                warn!(line = line_no, error = %e, "malformed rule");
                return Err(e);
            }
            Err(_) => debug!(line = line_no, "skipping non-rule line"),
        }
    }

    debug!(
        rules = set.len(),
        emotions = ?set.emotions(),
        "parsed rule set"
    );
    Ok(set)
}

/// Parse a whole rule file held in memory
pub fn parse_rule_text(text: &str) -> Result<RuleSet, InferenceError> {
    parse_rules(text.lines())
}

fn parse_line(line: &str, line_no: usize) -> Result<FuzzyRule, InferenceError> {
    let tokens = tokenize(line.trim(), line_no)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        line_no,
    };
    let rule = parser.rule()?;
    parser.end()?;
    Ok(rule)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    line_no: usize,
}

impl<'a> Parser<'a> {
    fn rule(&mut self) -> Result<FuzzyRule, InferenceError> {
        let terms = self.conjunction()?;
        self.expect(TokenKind::Arrow, "'=>'")?;
        let (emotion, cf) = self.consequent()?;
        FuzzyRule::new(terms, emotion, cf)
    }

    fn conjunction(&mut self) -> Result<Vec<FuzzyTerm>, InferenceError> {
        let mut terms = vec![self.term()?];
        while self.peek_word("and") {
            self.pos += 1;
            terms.push(self.term()?);
        }
        Ok(terms)
    }

    fn term(&mut self) -> Result<FuzzyTerm, InferenceError> {
        self.expect(TokenKind::LParen, "'('")?;
        let variable = self.variable()?;
        self.expect_word("in")?;
        self.expect(TokenKind::LBracket, "'['")?;
        let lsb = self.bound(f64::NEG_INFINITY)?;
        self.expect(TokenKind::Comma, "','")?;
        let lst = self.bound(f64::NEG_INFINITY)?;
        self.expect(TokenKind::Comma, "','")?;
        let rst = self.bound(f64::INFINITY)?;
        self.expect(TokenKind::Comma, "','")?;
        let rsb = self.bound(f64::INFINITY)?;
        self.expect(TokenKind::RBracket, "']'")?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(FuzzyTerm::new(variable, lsb, lst, rst, rsb))
    }

    fn variable(&mut self) -> Result<usize, InferenceError> {
        let word = self.word("feature variable")?;
        word.strip_prefix('V')
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error(format!("expected feature variable V<n>, found '{word}'")))
    }

    /// A bound spelled with an `inf` suffix takes the infinity of its side
    fn bound(&mut self, infinity: f64) -> Result<f64, InferenceError> {
        let word = self.word("bound")?;
        if word.ends_with("inf") {
            return Ok(infinity);
        }
        parse_float(&word, true)
            .ok_or_else(|| self.error(format!("expected number or inf, found '{word}'")))
    }

    fn consequent(&mut self) -> Result<(String, f64), InferenceError> {
        self.expect_word("Emotions")?;
        self.expect(TokenKind::Equals, "'='")?;
        let emotion = self.word("emotion label")?;
        if !emotion.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(self.error(format!("invalid emotion label '{emotion}'")));
        }
        self.expect(TokenKind::LParen, "'('")?;
        self.expect_word("CF")?;
        self.expect(TokenKind::Equals, "'='")?;
        let raw = self.word("certainty factor")?;
        let cf = parse_float(&raw, false)
            .ok_or_else(|| self.error(format!("invalid certainty factor '{raw}'")))?;
        if !(cf > 0.0 && cf <= 1.0) {
            return Err(self.error(format!("certainty factor {cf} outside (0, 1]")));
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok((emotion, cf))
    }

    fn end(&self) -> Result<(), InferenceError> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(token) => Err(self.error(format!(
                "unexpected trailing input at column {}",
                token.offset + 1
            ))),
        }
    }

    fn peek_word(&self, expected: &str) -> bool {
        matches!(
            self.tokens.get(self.pos),
            Some(Token { kind: TokenKind::Word(w), .. }) if w == expected
        )
    }

    fn word(&mut self, what: &str) -> Result<String, InferenceError> {
        match self.tokens.get(self.pos) {
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => {
                self.pos += 1;
                Ok(w.clone())
            }
            other => Err(self.unexpected(other, what)),
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(), InferenceError> {
        if self.peek_word(expected) {
            self.pos += 1;
            Ok(())
        } else {
            let found = self.tokens.get(self.pos);
            Err(self.unexpected(found, &format!("'{expected}'")))
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), InferenceError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            other => Err(self.unexpected(other, what)),
        }
    }

    fn unexpected(&self, found: Option<&Token>, what: &str) -> InferenceError {
        match found {
            Some(token) => self.error(format!(
                "expected {what} at column {}, found {}",
                token.offset + 1,
                describe(&token.kind)
            )),
            None => self.error(format!("expected {what}, found end of line")),
        }
    }

    fn error(&self, message: String) -> InferenceError {
        InferenceError::parse(self.line_no, message)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Equals => "'='".to_string(),
        TokenKind::Arrow => "'=>'".to_string(),
        TokenKind::Word(w) => format!("'{w}'"),
    }
}

/// Plain decimal literal with optional exponent; `inf`/`nan` spellings are rejected
fn parse_float(word: &str, signed: bool) -> Option<f64> {
    let digits = match word.strip_prefix(['-', '+']) {
        Some(rest) if signed => rest,
        Some(_) => return None,
        None => word,
    };
    let starts_numeric = digits
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    let only_numeric = digits
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'));
    if !starts_numeric || !only_numeric {
        return None;
    }
    word.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HAPPY: &str = "(V30 in [159.608, 160.424, inf, inf]) and (V35 in [30.0655, 30.2536, inf, inf]) => Emotions=Happy (CF = 0.97)";

    #[test]
    fn test_parse_reference_rule() {
        let rule = parse_rule(HAPPY).unwrap();

        assert_eq!(rule.emotion(), "Happy");
        assert!((rule.cf() - 0.97).abs() < 1e-12);
        assert_eq!(
            rule.terms(),
            &[
                FuzzyTerm::new(30, 159.608, 160.424, f64::INFINITY, f64::INFINITY),
                FuzzyTerm::new(35, 30.0655, 30.2536, f64::INFINITY, f64::INFINITY),
            ]
        );
    }

    #[test]
    fn test_inf_bounds_follow_their_side() {
        let rule =
            parse_rule("(V2 in [-inf, -inf, 80.5, 90]) => Emotions=Sad (CF = 0.5)").unwrap();
        let term = rule.terms()[0];
        assert_eq!(term.lsb, f64::NEG_INFINITY);
        assert_eq!(term.lst, f64::NEG_INFINITY);
        assert_eq!(term.rst, 80.5);
        assert_eq!(term.rsb, 90.0);

        // side decides the sign, not the spelling
        let rule = parse_rule("(V2 in [inf, 1, 2, -inf]) => Emotions=Sad (CF = 1)").unwrap();
        assert_eq!(rule.terms()[0].lsb, f64::NEG_INFINITY);
        assert_eq!(rule.terms()[0].rsb, f64::INFINITY);
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        let tight = parse_rule("(V1 in [1,2,3,4])and(V2 in [5,6,7,8])=>Emotions=Fear (CF=0.4)")
            .unwrap();
        let loose = parse_rule(
            "   ( V1  in [ 1 , 2 , 3 , 4 ] )   and   (V2 in [5, 6, 7, 8])   =>   Emotions = Fear ( CF = 0.4 )  ",
        )
        .unwrap();
        assert_eq!(tight, loose);
    }

    #[test]
    fn test_display_round_trip() {
        let rule = parse_rule(HAPPY).unwrap();
        assert_eq!(parse_rule(&rule.to_string()).unwrap(), rule);
    }

    #[test]
    fn test_malformed_rules() {
        let bad = [
            "(V30 in [1, 2, 3]) => Emotions=Happy (CF = 0.9)",
            "(V30 in [1, 2, 3, 4]) => Emotions=Happy",
            "(V30 in [1, 2, 3, 4])",
            "(X30 in [1, 2, 3, 4]) => Emotions=Happy (CF = 0.9)",
            "(V30 in [1, 2, 3, 4]) => Emotions=Happy (CF = 0.9) extra",
            "(V30 in [1, 2, nan, 4]) => Emotions=Happy (CF = 0.9)",
            "(V30 in [1, 2, 3, 4]) => Emotions=Happy (CF = 1.5)",
            "(V30 in [1, 2, 3, 4]) => Emotions=Happy (CF = -0.5)",
            "=> Emotions=Happy (CF = 0.9)",
        ];
        for line in bad {
            assert!(
                matches!(parse_rule(line), Err(InferenceError::Parse { .. })),
                "accepted: {line}"
            );
        }
    }

    #[test]
    fn test_tolerant_skip() {
        let lines = [
            "",
            "FURIA rules:",
            "===========",
            "   ",
            HAPPY,
            "Number of Rules : 1",
        ];
        let set = parse_rules(lines).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.emotions(), ["Happy"]);
    }

    #[test]
    fn test_malformed_rule_line_fails() {
        let lines = [HAPPY, "(V31 in [1, 2, 3 => Emotions=Sad (CF = 0.5)"];
        match parse_rules(lines) {
            Err(InferenceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_indented_broken_rule_is_skipped() {
        // only the literal "(V" prefix makes a line mandatory
        let lines = [HAPPY, "  (V31 in [1, 2"];
        assert_eq!(parse_rules(lines).unwrap().len(), 1);
    }

    #[test]
    fn test_idempotent_parse() {
        let text = include_str!("../../data/sample_rules.txt");
        let first = parse_rule_text(text).unwrap();
        let second = parse_rule_text(text).unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first.emotions(), second.emotions());
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_file() {
        let set = parse_rule_text(include_str!("../../data/sample_rules.txt")).unwrap();
        assert_eq!(set.len(), 8);
        assert_eq!(set.emotions(), ["Happy", "Sad", "Surprise", "Neutral"]);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("1.5e2", true), Some(150.0));
        assert_eq!(parse_float("-3", true), Some(-3.0));
        assert_eq!(parse_float("-3", false), None);
        assert_eq!(parse_float("NaN", true), None);
        assert_eq!(parse_float("infinity", true), None);
        assert_eq!(parse_float("1.2.3", true), None);
    }
}
