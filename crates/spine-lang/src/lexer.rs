//! Position-tracked tokenizer for intent source text.
//!
//! Whitespace and `#` line comments are skipped between tokens.  Every token
//! records the 1-based line and column of its first character so parse
//! failures can point at the offending input.

use crate::ParseError;
use crate::ast::ComparisonOp;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Keyword, identifier, cluster token, time key, unit word…
    Word(String),
    /// Numeric literal; `suffix` holds letters glued to it (`30s`, `80GB`).
    Number { text: String, suffix: String },
    /// Double-quoted string literal, escapes already resolved.
    Str(String),
    LBrace,
    RBrace,
    Colon,
    Op(ComparisonOp),
    Eof,
}

impl TokenKind {
    /// Short description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Word(w) => format!("'{w}'"),
            Self::Number { text, suffix } => format!("number '{text}{suffix}'"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Op(op) => format!("operator '{}'", op.as_str()),
            Self::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Tokenize `source` completely.  The returned vector always ends with
/// [`TokenKind::Eof`].
///
/// # Errors
///
/// [`ParseError`] for characters outside the language and unterminated
/// string literals.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                });
                return Ok(tokens);
            };
            let kind = match c {
                '{' => {
                    self.bump();
                    TokenKind::LBrace
                }
                '}' => {
                    self.bump();
                    TokenKind::RBrace
                }
                ':' => {
                    self.bump();
                    TokenKind::Colon
                }
                '"' => self.string(line, column)?,
                '>' | '<' | '=' | '!' => self.operator(line, column)?,
                '-' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(),
                c if c.is_ascii_digit() => self.number(),
                c if c.is_alphabetic() || c == '_' => self.word(),
                other => {
                    return Err(ParseError::new(
                        line,
                        column,
                        format!("unexpected character '{other}'"),
                    ));
                }
            };
            tokens.push(Token { kind, line, column });
        }
    }

    fn word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Word(text)
    }

    fn number(&mut self) -> TokenKind {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.bump();
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        let mut suffix = String::new();
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' {
                    suffix.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        TokenKind::Number { text, suffix }
    }

    fn operator(&mut self, line: usize, column: usize) -> Result<TokenKind, ParseError> {
        let first = self.bump().unwrap_or_default();
        let two = self.peek().map(|second| format!("{first}{second}"));
        if let Some(op) = two.as_deref().and_then(ComparisonOp::from_symbol) {
            self.bump();
            return Ok(TokenKind::Op(op));
        }
        ComparisonOp::from_symbol(&first.to_string())
            .map(TokenKind::Op)
            .ok_or_else(|| ParseError::new(line, column, format!("incomplete operator '{first}'")))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<TokenKind, ParseError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(ParseError::new(line, column, "unterminated string literal"));
                }
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    _ => {
                        return Err(ParseError::new(
                            self.line,
                            self.column,
                            "invalid escape in string literal",
                        ));
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn words_braces_and_eof() {
        assert_eq!(
            kinds("INTENT t { }"),
            vec![
                TokenKind::Word("INTENT".into()),
                TokenKind::Word("t".into()),
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("# header\nA # trailing\nB"),
            vec![
                TokenKind::Word("A".into()),
                TokenKind::Word("B".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn number_with_unit_suffix() {
        assert_eq!(
            kinds("30s 1.5h 80"),
            vec![
                TokenKind::Number {
                    text: "30".into(),
                    suffix: "s".into()
                },
                TokenKind::Number {
                    text: "1.5".into(),
                    suffix: "h".into()
                },
                TokenKind::Number {
                    text: "80".into(),
                    suffix: String::new()
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn operators_match_greedily() {
        assert_eq!(
            kinds(">= > != =="),
            vec![
                TokenKind::Op(ComparisonOp::Ge),
                TokenKind::Op(ComparisonOp::Gt),
                TokenKind::Op(ComparisonOp::Ne),
                TokenKind::Op(ComparisonOp::Eq),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lone_bang_is_an_error() {
        let err = tokenize("!x").unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("A\n  B").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn string_literal_with_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"""#),
            vec![TokenKind::Str("say \"hi\"".into()), TokenKind::Eof]
        );
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn unknown_character_reports_position() {
        let err = tokenize("A\n @").unwrap_err();
        assert_eq!((err.line, err.column), (2, 2));
    }
}
