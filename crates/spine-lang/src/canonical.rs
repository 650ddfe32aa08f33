//! Deterministic renderings of an [`Intent`].
//!
//! - [`canonical_json`] – RFC 8785 sorted-key JSON of the AST.
//! - [`intent_hash`] – SHA-256 of that JSON.  Two intents that differ only in
//!   whitespace, comments or quoting of their source hash identically; any
//!   semantic change produces a different hash.
//! - [`render`] – normalized intent source text that parses back to an equal
//!   AST (metadata has no source syntax and is not rendered).

use std::fmt::Write as _;

use spine_types::SpineError;
use spine_types::hashing::{canonical_json as jcs, sha256_hex};

use crate::ast::{ConstraintValue, Intent};
use crate::grammar::{
    KW_AND, KW_AUTHORITY, KW_CAPABILITY, KW_CONSTRAINT, KW_HARDWARE, KW_INTENT, KW_NOT,
    KW_OBJECTIVE, KW_ONLY, KW_TIME, KW_TRUST, TRUST_LEVEL_LABEL, is_keyword,
};

/// # Errors
///
/// [`SpineError::Serialization`] if a numeric field is not finite.
pub fn canonical_json(intent: &Intent) -> Result<String, SpineError> {
    if let Some(field) = first_non_finite(intent) {
        return Err(SpineError::Serialization(format!(
            "{field} of intent '{}' is not a finite number",
            intent.name()
        )));
    }
    jcs(intent)
}

/// NaN and infinity have no JSON form; serialized they become `null`.
fn first_non_finite(intent: &Intent) -> Option<String> {
    let constraint = intent
        .constraints()
        .iter()
        .find(|c| c.value.as_f64().is_some_and(|n| !n.is_finite()));
    if let Some(c) = constraint {
        return Some(format!("constraint '{}'", c.name));
    }
    intent
        .time_specs()
        .iter()
        .find(|t| !t.seconds().is_finite())
        .map(|t| format!("time {}", t.key.as_str()))
}

/// Lowercase hex SHA-256 of [`canonical_json`].
///
/// # Errors
///
/// [`SpineError::Serialization`] if a numeric field is not finite.
pub fn intent_hash(intent: &Intent) -> Result<String, SpineError> {
    Ok(sha256_hex(canonical_json(intent)?.as_bytes()))
}

/// Render `intent` back to source text in a fixed statement order.
pub fn render(intent: &Intent) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{KW_INTENT} {} {{", word_or_quoted(intent.name()));
    let _ = writeln!(out, "    {KW_OBJECTIVE} {}", word_or_quoted(intent.objective()));

    if let Some(hw) = intent.hardware() {
        let mut line = format!("    {KW_HARDWARE}");
        if !hw.only().is_empty() {
            let list: Vec<&str> = hw.only().iter().map(|c| c.as_str()).collect();
            let _ = write!(line, " {KW_ONLY} {}", list.join(&format!(" {KW_AND} ")));
        }
        if !hw.not().is_empty() {
            let list: Vec<&str> = hw.not().iter().map(|c| c.as_str()).collect();
            let _ = write!(line, " {KW_NOT} {}", list.join(&format!(" {KW_AND} ")));
        }
        let _ = writeln!(out, "{line}");
    }
    for c in intent.constraints() {
        let value = match &c.value {
            ConstraintValue::Number(n) => n.to_string(),
            ConstraintValue::Text(t) => word_or_quoted(t),
        };
        let _ = writeln!(
            out,
            "    {KW_CONSTRAINT} {} {} {value}",
            word_or_quoted(&c.name),
            c.op.as_str()
        );
    }
    for capability in intent.capabilities() {
        let _ = writeln!(out, "    {KW_CAPABILITY} {}", word_or_quoted(capability));
    }
    for t in intent.time_specs() {
        let _ = writeln!(
            out,
            "    {KW_TIME} {}: {}{}",
            t.key.as_str(),
            t.value,
            t.unit.as_str()
        );
    }
    for a in intent.authorities() {
        let _ = writeln!(
            out,
            "    {KW_AUTHORITY} {}: {}",
            a.key.as_str(),
            word_or_quoted(&a.value)
        );
    }
    if let Some(level) = intent.trust_level() {
        let _ = writeln!(out, "    {KW_TRUST} {TRUST_LEVEL_LABEL}: {}", level.as_str());
    }
    out.push('}');
    out.push('\n');
    out
}

/// Emit `text` bare when the lexer would read it back as the same word,
/// quoted otherwise.
fn word_or_quoted(text: &str) -> String {
    let mut chars = text.chars();
    let bare = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !is_keyword(text);
    if bare {
        text.to_string()
    } else {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        format!("\"{escaped}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use proptest::prelude::*;

    const SOURCE: &str = "INTENT job { OBJECTIVE train HARDWARE ONLY GB200 AND MI300X \
                          CONSTRAINT GPU_VRAM >= 80 CAPABILITY llm_training \
                          TIME deadline: 30m AUTHORITY user: alice TRUST level: trusted }";

    #[test]
    fn non_finite_numbers_cannot_be_hashed() {
        use crate::ast::{ComparisonOp, TimeKey, TimeUnit};

        let positive = Intent::builder("t", "o")
            .constraint("X", ComparisonOp::Ge, f64::INFINITY)
            .build();
        let err = intent_hash(&positive).unwrap_err();
        assert!(matches!(err, SpineError::Serialization(ref m) if m.contains("constraint 'X'")));

        let negative = Intent::builder("t", "o")
            .constraint("X", ComparisonOp::Ge, f64::NEG_INFINITY)
            .build();
        assert!(canonical_json(&negative).is_err());

        let overflowing = Intent::builder("t", "o")
            .time(TimeKey::Deadline, f64::MAX, TimeUnit::Hours)
            .build();
        assert!(intent_hash(&overflowing).is_err());
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let intent = parse(SOURCE).unwrap();
        assert_eq!(intent_hash(&intent).unwrap(), intent_hash(&intent).unwrap());
        assert_eq!(intent_hash(&intent).unwrap().len(), 64);
    }

    #[test]
    fn hash_ignores_whitespace_and_comments() {
        let reformatted = "# comment\nINTENT job {\n  OBJECTIVE \"train\"   # same objective\n\
                           HARDWARE ONLY MI300X AND GB200\n CONSTRAINT GPU_VRAM>=80\n\
                           CAPABILITY llm_training\n TIME deadline:30m\n\
                           AUTHORITY user:alice\n TRUST level: trusted\n}\n";
        let a = parse(SOURCE).unwrap();
        let b = parse(reformatted).unwrap();
        assert_eq!(intent_hash(&a).unwrap(), intent_hash(&b).unwrap());
    }

    #[test]
    fn hash_changes_with_semantic_edit() {
        let a = parse(SOURCE).unwrap();
        let b = parse(&SOURCE.replace(">= 80", ">= 81")).unwrap();
        let c = parse(&SOURCE.replace("user: alice", "user: bob")).unwrap();
        assert_ne!(intent_hash(&a).unwrap(), intent_hash(&b).unwrap());
        assert_ne!(intent_hash(&a).unwrap(), intent_hash(&c).unwrap());
    }

    #[test]
    fn canonical_json_has_sorted_keys() {
        let json = canonical_json(&parse(SOURCE).unwrap()).unwrap();
        let authorities = json.find("\"authorities\"").unwrap();
        let name = json.find("\"name\"").unwrap();
        let trust = json.find("\"trust_level\"").unwrap();
        assert!(authorities < name && name < trust);
    }

    #[test]
    fn render_reparses_to_equal_intent() {
        let intent = parse(SOURCE).unwrap();
        let rendered = render(&intent);
        assert_eq!(parse(&rendered).unwrap(), intent);
    }

    #[test]
    fn render_quotes_non_words() {
        let intent = parse(
            "INTENT t { OBJECTIVE \"two words\" CONSTRAINT MODE == \"80\" CONSTRAINT MEM <= 512GB }",
        )
        .unwrap();
        let rendered = render(&intent);
        assert!(rendered.contains("OBJECTIVE \"two words\""));
        assert_eq!(parse(&rendered).unwrap(), intent);
    }

    proptest! {
        #[test]
        fn padding_never_changes_the_hash(pad in "[ \t\n]{1,6}", comment in "[a-z ]{0,12}") {
            let spaced = SOURCE
                .replace(' ', &pad)
                .replacen('{', &format!("{{ # {comment}\n"), 1);
            let a = parse(SOURCE).unwrap();
            let b = parse(&spaced).unwrap();
            prop_assert_eq!(intent_hash(&a).unwrap(), intent_hash(&b).unwrap());
        }
    }
}
