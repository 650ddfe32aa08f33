//! [`PolicyEngine`] – generic rule evaluation over an [`Intent`].
//!
//! Rules are evaluated in insertion order and every rule runs; failures are
//! partitioned by [`Severity`] into a [`PolicyReport`].  A rule that panics
//! is recorded as a violation instead of taking the caller down with it.
//!
//! Three built-in rules are provided:
//! - [`RequireAuthority`] – at least one `AUTHORITY` of a given key.
//! - [`MaxDeadline`] – caps the requested deadline.
//! - [`ForbidTrustLevel`] – rejects a specific trust level.
//!
//! # Example
//!
//! ```
//! use spine_kernel::policy::{MaxDeadline, PolicyEngine, Severity};
//! use spine_lang::parse;
//!
//! let mut engine = PolicyEngine::new();
//! engine.add_rule(Box::new(MaxDeadline { max_seconds: 60.0, severity: Severity::Error }));
//!
//! let ok = parse("INTENT a { OBJECTIVE o TIME deadline: 30s }").unwrap();
//! assert!(engine.evaluate(&ok).passed());
//!
//! let slow = parse("INTENT b { OBJECTIVE o TIME deadline: 2h }").unwrap();
//! assert!(!engine.evaluate(&slow).passed());
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use spine_lang::{AuthorityKey, Intent, TrustLevel};
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// How a failed rule is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks authorization.
    Error,
    Warning,
    Info,
}

/// A single named predicate over an [`Intent`].
///
/// Implement this trait to add custom policy and register it with
/// [`PolicyEngine::add_rule`].
pub trait PolicyRule: Send + Sync {
    /// Human-readable name used in report messages.
    fn name(&self) -> &str;

    fn severity(&self) -> Severity;

    /// `Ok(())` when the intent satisfies the rule, otherwise a description
    /// of what is wrong.
    fn check(&self, intent: &Intent) -> Result<(), String>;
}

/// Adapter turning a closure into a [`PolicyRule`].
pub struct FnRule<F> {
    name: String,
    severity: Severity,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&Intent) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, severity: Severity, check: F) -> Self {
        Self {
            name: name.into(),
            severity,
            check,
        }
    }
}

impl<F> PolicyRule for FnRule<F>
where
    F: Fn(&Intent) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, intent: &Intent) -> Result<(), String> {
        (self.check)(intent)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PolicyReport
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of evaluating every rule against one intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl PolicyReport {
    /// `true` when no error-severity rule failed.
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PolicyEngine
// ────────────────────────────────────────────────────────────────────────────

/// Ordered set of [`PolicyRule`]s.
#[derive(Default)]
pub struct PolicyEngine {
    rules: Vec<Box<dyn PolicyRule>>,
}

impl PolicyEngine {
    /// Create an engine with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule.  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn PolicyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule against `intent`.
    pub fn evaluate(&self, intent: &Intent) -> PolicyReport {
        let mut report = PolicyReport::default();
        for rule in &self.rules {
            let outcome = catch_unwind(AssertUnwindSafe(|| rule.check(intent)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(reason)) => format!("{}: {reason}", rule.name()),
                Err(_) => {
                    warn!(rule = rule.name(), intent = intent.name(), "policy rule panicked");
                    report
                        .violations
                        .push(format!("{}: rule failed internally", rule.name()));
                    continue;
                }
            };
            match rule.severity() {
                Severity::Error => report.violations.push(message),
                Severity::Warning => report.warnings.push(message),
                Severity::Info => report.notes.push(message),
            }
        }
        report
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Requires at least one `AUTHORITY <key>:` entry.
pub struct RequireAuthority {
    pub key: AuthorityKey,
    pub severity: Severity,
}

impl PolicyRule for RequireAuthority {
    fn name(&self) -> &str {
        "require_authority"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, intent: &Intent) -> Result<(), String> {
        if intent.authorities_for(self.key).next().is_some() {
            Ok(())
        } else {
            Err(format!("no '{}' authority declared", self.key.as_str()))
        }
    }
}

/// Rejects deadlines longer than `max_seconds`.  Intents without a deadline
/// pass.
pub struct MaxDeadline {
    pub max_seconds: f64,
    pub severity: Severity,
}

impl PolicyRule for MaxDeadline {
    fn name(&self) -> &str {
        "max_deadline"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, intent: &Intent) -> Result<(), String> {
        match intent.deadline_seconds() {
            Some(seconds) if seconds > self.max_seconds => Err(format!(
                "deadline {seconds}s exceeds cap {}s",
                self.max_seconds
            )),
            _ => Ok(()),
        }
    }
}

/// Flags intents declaring `level`.
pub struct ForbidTrustLevel {
    pub level: TrustLevel,
    pub severity: Severity,
}

impl PolicyRule for ForbidTrustLevel {
    fn name(&self) -> &str {
        "forbid_trust_level"
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn check(&self, intent: &Intent) -> Result<(), String> {
        if intent.trust_level() == Some(self.level) {
            Err(format!("trust level '{}' is not accepted", self.level.as_str()))
        } else {
            Ok(())
        }
    }
}
