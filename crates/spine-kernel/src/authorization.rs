//! [`AuthorizationEngine`] – the single gate an [`Intent`] must pass before
//! any contract can be issued for it.
//!
//! [`AuthorizationEngine::authorize`] enforces the submission invariants
//! first and then every registered [`PolicyRule`][crate::policy::PolicyRule]:
//!
//! 1. at least one `AUTHORITY` statement;
//! 2. trust level is not `untrusted`;
//! 3. a `HARDWARE` statement, when present, names at least one cluster;
//! 4. constraint names are unique;
//! 5. every `TIME` value is strictly positive and every number finite;
//! 6. no error-severity policy violation.
//!
//! Every check runs so the result lists all violations at once.  Both
//! outcomes are cached by intent name; a denial is returned as
//! [`SpineError::AuthorizationDenied`] and never carries a proof.
//!
//! # Example
//!
//! ```
//! use spine_kernel::AuthorizationEngine;
//! use spine_lang::parse;
//!
//! let engine = AuthorizationEngine::default();
//!
//! let ok = parse("INTENT job { OBJECTIVE train AUTHORITY user: alice }").unwrap();
//! let granted = engine.authorize(&ok).unwrap();
//! assert!(engine.verify("job", &granted.proof));
//!
//! let rogue = parse("INTENT rogue { OBJECTIVE x TRUST level: untrusted }").unwrap();
//! assert!(engine.authorize(&rogue).is_err());
//! assert!(!engine.cached("rogue").unwrap().authorized);
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spine_lang::{Intent, TrustLevel, intent_hash};
use spine_types::SpineError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy::PolicyEngine;

/// Outcome of authorizing one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub intent_name: String,
    pub authorized: bool,
    pub reason: String,
    /// Opaque token; non-empty iff `authorized`.
    pub proof: String,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    /// Hash of the intent the proof was minted for.
    pub intent_hash: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Checks intents against the built-in invariants and a [`PolicyEngine`],
/// caching each result by intent name.
///
/// Shared between pipeline invocations through an `Arc`; the cache is the
/// only mutable state and is guarded by a [`RwLock`].
#[derive(Default)]
pub struct AuthorizationEngine {
    policy: PolicyEngine,
    results: RwLock<HashMap<String, AuthorizationResult>>,
}

impl AuthorizationEngine {
    pub fn new(policy: PolicyEngine) -> Self {
        Self {
            policy,
            results: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Authorize `intent`, caching the result under its name.
    ///
    /// A later call for the same name replaces the cached result.
    ///
    /// # Errors
    ///
    /// - [`SpineError::AuthorizationDenied`] – any invariant or
    ///   error-severity policy rule failed.
    /// - [`SpineError::Serialization`] – an intent that passed every check
    ///   could not be hashed.
    pub fn authorize(&self, intent: &Intent) -> Result<AuthorizationResult, SpineError> {
        let mut violations = invariant_violations(intent);
        let report = self.policy.evaluate(intent);
        violations.extend(report.violations);
        // A denied intent may hold values that cannot be hashed.
        let hash = if violations.is_empty() {
            intent_hash(intent)?
        } else {
            intent_hash(intent).unwrap_or_default()
        };

        let authorized = violations.is_empty();
        let reason = match violations.as_slice() {
            [] => "all authorization checks passed".to_string(),
            [only] => only.clone(),
            many => format!("{} violations, first: {}", many.len(), many[0]),
        };
        let proof = if authorized {
            mint_proof(&hash)
        } else {
            String::new()
        };
        let result = AuthorizationResult {
            intent_name: intent.name().to_string(),
            authorized,
            reason,
            proof,
            violations,
            warnings: report.warnings,
            intent_hash: hash,
            evaluated_at: Utc::now(),
        };

        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.intent_name.clone(), result.clone());

        if authorized {
            info!(
                intent = intent.name(),
                warnings = result.warnings.len(),
                "intent authorized"
            );
            Ok(result)
        } else {
            warn!(
                intent = intent.name(),
                violations = ?result.violations,
                "intent denied"
            );
            Err(SpineError::AuthorizationDenied {
                intent: result.intent_name,
                reason: result.reason,
                violations: result.violations,
            })
        }
    }

    /// `true` when `name` has a cached, granted result whose proof equals
    /// `proof`.  Never re-evaluates.
    pub fn verify(&self, name: &str, proof: &str) -> bool {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|r| r.authorized && !proof.is_empty() && r.proof == proof)
    }

    pub fn cached(&self, name: &str) -> Option<AuthorizationResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

fn invariant_violations(intent: &Intent) -> Vec<String> {
    let mut violations = Vec::new();

    if intent.authorities().is_empty() {
        violations.push("no authority declared".to_string());
    }
    if intent.trust_level() == Some(TrustLevel::Untrusted) {
        violations.push("trust level is untrusted".to_string());
    }
    if intent.hardware().is_some_and(|hw| hw.is_empty()) {
        violations.push("hardware specification names no cluster".to_string());
    }

    let mut seen = BTreeSet::new();
    for c in intent.constraints() {
        if !seen.insert(c.name.as_str()) {
            violations.push(format!("duplicate constraint '{}'", c.name));
        }
    }

    for c in intent.constraints() {
        if c.value.as_f64().is_some_and(|n| !n.is_finite()) {
            violations.push(format!("constraint '{}' is not a finite number", c.name));
        }
    }

    for t in intent.time_specs() {
        if t.value <= 0.0 || t.value.is_nan() {
            violations.push(format!(
                "time {} must be positive, got {}",
                t.key.as_str(),
                t.value
            ));
        } else if !t.seconds().is_finite() {
            violations.push(format!("time {} is not a finite duration", t.key.as_str()));
        }
    }

    violations
}

/// Process-unique proof bound to the intent hash prefix.
fn mint_proof(hash: &str) -> String {
    let prefix = hash.get(..16).unwrap_or(hash);
    format!("authz-{prefix}-{}", Uuid::new_v4().simple())
}
