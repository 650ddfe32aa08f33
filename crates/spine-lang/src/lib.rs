//! `spine-lang` – the intent language front end.
//!
//! Turns intent source text into an immutable [`Intent`] and gives it a
//! deterministic identity.
//!
//! # Modules
//!
//! - [`grammar`] – the fixed token vocabulary (keywords, cluster tokens,
//!   operators, time keys/units, authority keys, trust levels).
//! - [`lexer`] – position-tracked tokenizer; skips whitespace and `#`
//!   comments.
//! - [`parser`] – [`parse`]: single-pass recursive-descent reader.
//! - [`ast`] – [`Intent`] and its parts, plus derived queries such as
//!   [`Intent::deadline_seconds`] and [`Intent::requires_cluster`].
//! - [`canonical`] – canonical JSON, SHA-256 [`intent_hash`], and source
//!   [`render`]ing.

pub mod ast;
pub mod canonical;
pub mod grammar;
pub mod lexer;
pub mod parser;

pub use ast::{
    Authority, AuthorityKey, ComparisonOp, Constraint, ConstraintValue, HardwareSpec,
    HardwareSpecError, Intent, IntentBuilder, TimeKey, TimeSpec, TimeUnit, TrustLevel,
};
pub use canonical::{canonical_json, intent_hash, render};
pub use parser::parse;

use schemars::schema::RootSchema;
use spine_types::SpineError;
use thiserror::Error;

/// Malformed or incomplete intent source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl From<ParseError> for SpineError {
    fn from(e: ParseError) -> Self {
        SpineError::Parse {
            line: e.line,
            column: e.column,
            message: e.message,
        }
    }
}

/// JSON Schema describing the serialized [`Intent`] AST.
pub fn intent_schema() -> RootSchema {
    schemars::schema_for!(Intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_converts_with_position() {
        let err = parse("INTENT").unwrap_err();
        let spine: SpineError = err.clone().into();
        assert_eq!(
            spine,
            SpineError::Parse {
                line: err.line,
                column: err.column,
                message: err.message,
            }
        );
    }

    #[test]
    fn schema_names_intent_fields() {
        let schema = serde_json::to_value(intent_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("objective"));
        assert!(properties.contains_key("hardware"));
    }
}
