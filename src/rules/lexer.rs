//! Tokenizer for the rule language

use crate::error::InferenceError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Arrow,
    /// Identifier, keyword or numeric literal; interpreted by the parser
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset in the line, for error messages
    pub offset: usize,
}

/// Split one rule line into tokens. Whitespace separates but is otherwise ignored.
pub(crate) fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>, InferenceError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '=' => {
                chars.next();
                if let Some(&(_, '>')) = chars.peek() {
                    chars.next();
                    tokens.push(Token {
                        kind: TokenKind::Arrow,
                        offset,
                    });
                } else {
                    tokens.push(Token {
                        kind: TokenKind::Equals,
                        offset,
                    });
                }
                continue;
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Word(word),
                    offset,
                });
                continue;
            }
            other => {
                return Err(InferenceError::parse(
                    line_no,
                    format!("unexpected character '{other}' at column {}", offset + 1),
                ))
            }
        };
        chars.next();
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+')
}
