//! Recursive-descent parser: `INTENT <name> { <statement>* }`.
//!
//! Statements are dispatched on their leading keyword.  `OBJECTIVE`,
//! `TRUST` and `HARDWARE` may appear at most once; everything else may
//! repeat.  Every failure carries the line/column of the token that caused
//! it.
//!
//! # Example
//!
//! ```
//! use spine_lang::parse;
//! use spine_types::ClusterType;
//!
//! let intent = parse("INTENT t { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }").unwrap();
//! assert_eq!(intent.name(), "t");
//! assert!(intent.requires_cluster(&ClusterType::Gb200));
//! assert!(!intent.requires_cluster(&ClusterType::Cpu));
//! ```

use spine_types::ClusterType;
use tracing::debug;

use crate::ParseError;
use crate::ast::{
    AuthorityKey, ComparisonOp, ConstraintValue, HardwareSpec, Intent, IntentBuilder, TimeKey,
    TimeUnit, TrustLevel,
};
use crate::grammar::{
    CLUSTER_TOKENS, KW_AND, KW_AUTHORITY, KW_CAPABILITY, KW_CONSTRAINT, KW_HARDWARE, KW_INTENT,
    KW_NOT, KW_OBJECTIVE, KW_ONLY, KW_TIME, KW_TRUST, TRUST_LEVEL_LABEL, is_keyword,
    is_statement_keyword,
};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parse one intent from `source`.
///
/// # Errors
///
/// [`ParseError`] with the position of the first malformed token, a
/// duplicated single-use statement, a missing `OBJECTIVE`, or overlapping
/// `HARDWARE` sets.
pub fn parse(source: &str) -> Result<Intent, ParseError> {
    let tokens = tokenize(source)?;
    let intent = Parser::new(tokens).intent()?;
    debug!(intent = intent.name(), "parsed intent");
    Ok(intent)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Single-use statements seen so far.
#[derive(Default)]
struct Seen {
    objective: Option<String>,
    trust: bool,
    hardware: bool,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with Eof, and `advance`
        // never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_at(token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(token.line, token.column, message)
    }

    fn expected(token: &Token, what: &str) -> ParseError {
        Self::error_at(token, format!("expected {what}, found {}", token.kind.describe()))
    }

    fn peek_word(&self) -> Option<&str> {
        match &self.peek().kind {
            TokenKind::Word(w) => Some(w),
            _ => None,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Token, ParseError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Word(w) if w == keyword => Ok(token),
            _ => Err(Self::expected(&token, &format!("'{keyword}'"))),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(Self::expected(&token, &kind.describe()))
        }
    }

    /// A non-keyword word or a string literal.
    fn identifier(&mut self, what: &str) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Word(w) if !is_keyword(&w) => Ok(w),
            TokenKind::Str(s) if !s.is_empty() => Ok(s),
            _ => Err(Self::expected(&token, what)),
        }
    }

    fn intent(&mut self) -> Result<Intent, ParseError> {
        self.expect_keyword(KW_INTENT)?;
        let name = self.identifier("intent name")?;
        self.expect(TokenKind::LBrace)?;

        let mut seen = Seen::default();
        let mut builder_ops: Vec<Statement> = Vec::new();

        loop {
            let token = self.peek().clone();
            match &token.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(Self::expected(&token, "'}'")),
                TokenKind::Word(w) if is_statement_keyword(w) => {
                    let statement = self.statement(w.clone(), &token, &mut seen)?;
                    builder_ops.push(statement);
                }
                _ => return Err(Self::expected(&token, "statement keyword")),
            }
        }
        let close = self.expect(TokenKind::RBrace)?;
        let trailing = self.peek().clone();
        if trailing.kind != TokenKind::Eof {
            return Err(Self::expected(&trailing, "end of input"));
        }

        let Some(objective) = seen.objective else {
            return Err(Self::error_at(
                &close,
                format!("intent '{name}' is missing an OBJECTIVE statement"),
            ));
        };

        let builder = builder_ops
            .into_iter()
            .fold(Intent::builder(name, objective), Statement::apply);
        Ok(builder.build())
    }

    fn statement(
        &mut self,
        keyword: String,
        at: &Token,
        seen: &mut Seen,
    ) -> Result<Statement, ParseError> {
        match keyword.as_str() {
            KW_OBJECTIVE => {
                self.advance();
                if seen.objective.is_some() {
                    return Err(Self::error_at(at, "duplicate OBJECTIVE statement"));
                }
                seen.objective = Some(self.identifier("objective")?);
                Ok(Statement::Nothing)
            }
            KW_TRUST => {
                self.advance();
                if seen.trust {
                    return Err(Self::error_at(at, "duplicate TRUST statement"));
                }
                seen.trust = true;
                self.trust()
            }
            KW_HARDWARE => {
                self.advance();
                if seen.hardware {
                    return Err(Self::error_at(at, "duplicate HARDWARE statement"));
                }
                seen.hardware = true;
                self.hardware(at)
            }
            KW_CONSTRAINT => {
                self.advance();
                self.constraint()
            }
            KW_CAPABILITY => {
                self.advance();
                Ok(Statement::Capability(self.identifier("capability name")?))
            }
            KW_TIME => {
                self.advance();
                self.time()
            }
            KW_AUTHORITY => {
                self.advance();
                self.authority()
            }
            _ => Err(Self::expected(at, "statement keyword")),
        }
    }

    fn constraint(&mut self) -> Result<Statement, ParseError> {
        let name = self.identifier("constraint name")?;
        let token = self.advance();
        let TokenKind::Op(op) = token.kind else {
            return Err(Self::expected(&token, "comparison operator"));
        };
        let token = self.advance();
        let value = match &token.kind {
            TokenKind::Number { text, suffix } if suffix.is_empty() => {
                ConstraintValue::Number(parse_number(text, &token)?)
            }
            TokenKind::Number { text, suffix } => ConstraintValue::Text(format!("{text}{suffix}")),
            TokenKind::Word(w) if !is_keyword(w) => ConstraintValue::Text(w.clone()),
            TokenKind::Str(s) => ConstraintValue::Text(s.clone()),
            _ => return Err(Self::expected(&token, "constraint value")),
        };
        Ok(Statement::Constraint(name, op, value))
    }

    fn time(&mut self) -> Result<Statement, ParseError> {
        let token = self.advance();
        let key = match &token.kind {
            TokenKind::Word(w) => TimeKey::from_word(w),
            _ => None,
        }
        .ok_or_else(|| Self::expected(&token, "time key (deadline, budget, window)"))?;
        self.expect(TokenKind::Colon)?;

        let token = self.advance();
        let TokenKind::Number { text, suffix } = &token.kind else {
            return Err(Self::expected(&token, "duration such as 30s"));
        };
        let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| {
            Self::error_at(
                &token,
                format!("unknown time unit '{suffix}' (expected s, ms, m, h)"),
            )
        })?;
        let value = parse_number(text, &token)?;
        if !(value * unit.seconds_factor()).is_finite() {
            return Err(Self::error_at(
                &token,
                format!("duration '{text}{suffix}' is out of range"),
            ));
        }
        Ok(Statement::Time(key, value, unit))
    }

    fn authority(&mut self) -> Result<Statement, ParseError> {
        let token = self.advance();
        let key = match &token.kind {
            TokenKind::Word(w) => AuthorityKey::from_word(w),
            _ => None,
        }
        .ok_or_else(|| Self::expected(&token, "authority key (user, group, role)"))?;
        self.expect(TokenKind::Colon)?;
        let value = self.identifier("authority value")?;
        Ok(Statement::Authority(key, value))
    }

    fn trust(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword(TRUST_LEVEL_LABEL)?;
        self.expect(TokenKind::Colon)?;
        let token = self.advance();
        match &token.kind {
            TokenKind::Word(w) => TrustLevel::from_word(w)
                .map(Statement::Trust)
                .ok_or_else(|| {
                    Self::expected(&token, "trust level (verified, trusted, untrusted, sandbox)")
                }),
            _ => Err(Self::expected(&token, "trust level")),
        }
    }

    fn hardware(&mut self, at: &Token) -> Result<Statement, ParseError> {
        let mut only = Vec::new();
        let mut not = Vec::new();
        if self.peek_word() == Some(KW_ONLY) {
            self.advance();
            only = self.cluster_list()?;
        }
        if self.peek_word() == Some(KW_NOT) {
            self.advance();
            not = self.cluster_list()?;
        }
        let spec = HardwareSpec::new(only, not).map_err(|e| Self::error_at(at, e.to_string()))?;
        Ok(Statement::Hardware(spec))
    }

    fn cluster_list(&mut self) -> Result<Vec<ClusterType>, ParseError> {
        let mut clusters = vec![self.cluster()?];
        while self.peek_word() == Some(KW_AND) {
            self.advance();
            clusters.push(self.cluster()?);
        }
        Ok(clusters)
    }

    fn cluster(&mut self) -> Result<ClusterType, ParseError> {
        let token = self.advance();
        match &token.kind {
            TokenKind::Word(w) if CLUSTER_TOKENS.contains(&w.as_str()) => {
                Some(ClusterType::from(w.as_str()))
            }
            _ => None,
        }
        .ok_or_else(|| Self::expected(&token, "cluster type"))
    }
}

fn parse_number(text: &str, token: &Token) -> Result<f64, ParseError> {
    let value = text
        .parse::<f64>()
        .map_err(|_| Parser::error_at(token, format!("invalid number '{text}'")))?;
    if !value.is_finite() {
        return Err(Parser::error_at(
            token,
            format!("number '{text}' is out of range"),
        ));
    }
    Ok(value)
}

/// A parsed statement waiting to be folded into the builder.  Collected
/// first so the intent is only built once `OBJECTIVE` is known.
enum Statement {
    Nothing,
    Constraint(String, ComparisonOp, ConstraintValue),
    Capability(String),
    Time(TimeKey, f64, TimeUnit),
    Authority(AuthorityKey, String),
    Trust(TrustLevel),
    Hardware(HardwareSpec),
}

impl Statement {
    fn apply(builder: IntentBuilder, statement: Statement) -> IntentBuilder {
        match statement {
            Statement::Nothing => builder,
            Statement::Constraint(name, op, value) => builder.constraint(name, op, value),
            Statement::Capability(name) => builder.capability(name),
            Statement::Time(key, value, unit) => builder.time(key, value, unit),
            Statement::Authority(key, value) => builder.authority(key, value),
            Statement::Trust(level) => builder.trust(level),
            Statement::Hardware(spec) => builder.hardware(spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TrustLevel;

    const FULL: &str = r#"
        # training job
        INTENT train_llm {
            OBJECTIVE "fine-tune the support model"
            HARDWARE ONLY GB200 AND MI300X NOT CPU
            CONSTRAINT GPU_VRAM >= 80
            CONSTRAINT REGION == eu-west
            CAPABILITY llm_training
            CAPABILITY llm_inference
            TIME deadline: 2h
            TIME budget: 90m
            AUTHORITY user: alice
            AUTHORITY role: ml-engineer
            TRUST level: verified
        }
    "#;

    #[test]
    fn minimal_hardware_only_intent() {
        let intent =
            parse("INTENT t { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }").unwrap();
        assert_eq!(intent.name(), "t");
        assert_eq!(intent.objective(), "o");
        let hw = intent.hardware().unwrap();
        assert_eq!(hw.only().iter().collect::<Vec<_>>(), vec![&ClusterType::Gb200]);
        assert!(hw.not().is_empty());
        assert_eq!(intent.authorities().len(), 1);
        assert_eq!(intent.authorities()[0].key, AuthorityKey::User);
        assert_eq!(intent.authorities()[0].value, "alice");
        assert!(intent.requires_cluster(&ClusterType::Gb200));
        assert!(!intent.requires_cluster(&ClusterType::Cpu));
    }

    #[test]
    fn full_intent_parses_every_statement() {
        let intent = parse(FULL).unwrap();
        assert_eq!(intent.objective(), "fine-tune the support model");
        assert_eq!(intent.constraints().len(), 2);
        assert_eq!(intent.constraint("GPU_VRAM").unwrap().value, ConstraintValue::Number(80.0));
        assert_eq!(
            intent.constraint("REGION").unwrap().value,
            ConstraintValue::Text("eu-west".to_string())
        );
        assert_eq!(intent.capabilities(), ["llm_training", "llm_inference"]);
        assert_eq!(intent.deadline_seconds(), Some(7200.0));
        assert_eq!(intent.budget_seconds(), Some(5400.0));
        assert_eq!(intent.trust_level(), Some(TrustLevel::Verified));
        assert!(intent.excludes_cluster(&ClusterType::Cpu));
        assert!(intent.requires_cluster(&ClusterType::Mi300x));
    }

    #[test]
    fn missing_objective_is_rejected() {
        let err = parse("INTENT t {\n  AUTHORITY user: a\n}").unwrap_err();
        assert!(err.message.contains("OBJECTIVE"));
        assert_eq!((err.line, err.column), (3, 1));
    }

    #[test]
    fn duplicate_objective_reports_second_position() {
        let err = parse("INTENT t {\n OBJECTIVE a\n OBJECTIVE b\n}").unwrap_err();
        assert!(err.message.contains("duplicate OBJECTIVE"));
        assert_eq!((err.line, err.column), (3, 2));
    }

    #[test]
    fn duplicate_trust_and_hardware_are_rejected() {
        let trust = "INTENT t { OBJECTIVE o TRUST level: trusted TRUST level: verified }";
        assert!(parse(trust).unwrap_err().message.contains("duplicate TRUST"));
        let hw = "INTENT t { OBJECTIVE o HARDWARE ONLY CPU HARDWARE NOT QPU }";
        assert!(parse(hw).unwrap_err().message.contains("duplicate HARDWARE"));
    }

    #[test]
    fn repeated_statements_are_allowed() {
        let intent = parse(
            "INTENT t { OBJECTIVE o CAPABILITY a CAPABILITY b AUTHORITY user: x AUTHORITY group: y }",
        )
        .unwrap();
        assert_eq!(intent.capabilities().len(), 2);
        assert_eq!(intent.authorities().len(), 2);
    }

    #[test]
    fn overlapping_hardware_is_a_parse_failure() {
        let err = parse("INTENT t { OBJECTIVE o\n HARDWARE ONLY GB200 AND CPU NOT CPU }").unwrap_err();
        assert!(err.message.contains("overlap"));
        assert_eq!((err.line, err.column), (2, 2));
    }

    #[test]
    fn not_before_only_is_rejected() {
        // ONLY must come first; the stray ONLY is not a statement keyword.
        assert!(parse("INTENT t { OBJECTIVE o HARDWARE NOT CPU ONLY GB200 }").is_err());
    }

    #[test]
    fn empty_hardware_parses() {
        let intent = parse("INTENT t { OBJECTIVE o HARDWARE }").unwrap();
        assert!(intent.hardware().unwrap().is_empty());
    }

    #[test]
    fn unknown_cluster_token_is_rejected() {
        let err = parse("INTENT t { OBJECTIVE o HARDWARE ONLY TPU }").unwrap_err();
        assert!(err.message.contains("cluster type"));
    }

    #[test]
    fn bad_time_unit_and_key() {
        assert!(parse("INTENT t { OBJECTIVE o TIME deadline: 5d }").unwrap_err().message.contains("time unit"));
        assert!(parse("INTENT t { OBJECTIVE o TIME eta: 5s }").is_err());
        assert!(parse("INTENT t { OBJECTIVE o TIME deadline: soon }").is_err());
    }

    #[test]
    fn bad_trust_level() {
        assert!(parse("INTENT t { OBJECTIVE o TRUST level: maybe }").is_err());
        assert!(parse("INTENT t { OBJECTIVE o TRUST lvl: trusted }").is_err());
    }

    #[test]
    fn trailing_tokens_after_body_are_rejected() {
        let err = parse("INTENT t { OBJECTIVE o } extra").unwrap_err();
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn unterminated_body_is_rejected() {
        let err = parse("INTENT t { OBJECTIVE o").unwrap_err();
        assert!(err.message.contains("'}'"));
    }

    #[test]
    fn keyword_cannot_be_a_name() {
        assert!(parse("INTENT TIME { OBJECTIVE o }").is_err());
    }

    #[test]
    fn constraint_value_with_suffix_is_text() {
        let intent = parse("INTENT t { OBJECTIVE o CONSTRAINT HOST_MEMORY >= 512GB }").unwrap();
        assert_eq!(
            intent.constraint("HOST_MEMORY").unwrap().value,
            ConstraintValue::Text("512GB".to_string())
        );
    }

    #[test]
    fn out_of_range_numbers_are_rejected_at_their_token() {
        let huge = "9".repeat(400);
        let source = format!("INTENT t {{\n OBJECTIVE o\n CONSTRAINT X >= {huge}\n}}");
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("out of range"), "{}", err.message);
        assert_eq!((err.line, err.column), (3, 18));

        let negative = format!("INTENT t {{ OBJECTIVE o CONSTRAINT X >= -{huge} }}");
        assert!(parse(&negative).is_err());

        let deadline = format!("INTENT t {{ OBJECTIVE o TIME deadline: {huge}s }}");
        assert!(parse(&deadline).unwrap_err().message.contains("out of range"));

        // Finite as a number, infinite once converted to seconds.
        let hours = format!("INTENT t {{ OBJECTIVE o TIME budget: {}h }}", "9".repeat(308));
        assert!(parse(&hours).unwrap_err().message.contains("duration"));
    }

    #[test]
    fn clause_word_in_statement_position_is_rejected() {
        let err = parse("INTENT t { OBJECTIVE o ONLY CPU }").unwrap_err();
        assert!(err.message.contains("statement keyword"));
    }
}
