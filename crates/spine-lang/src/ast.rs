//! Abstract syntax tree of a parsed intent.
//!
//! An [`Intent`] is immutable once built: fields are private and only the
//! parser or an [`IntentBuilder`] can create one.  [`HardwareSpec`] enforces
//! that its `ONLY` and `NOT` sets are disjoint at construction and on
//! deserialization.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};
use spine_types::ClusterType;
use thiserror::Error;

use crate::grammar::{AUTHORITY_KEYS, COMPARISON_OPERATORS, TIME_KEYS, TIME_UNITS, TRUST_LEVELS};

// ─────────────────────────────────────────────────────────────────────────────
// Constraints
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ComparisonOp {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl ComparisonOp {
    /// Variants in the order of [`COMPARISON_OPERATORS`].
    const ALL: [Self; 6] = [Self::Ge, Self::Le, Self::Eq, Self::Ne, Self::Gt, Self::Lt];

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        COMPARISON_OPERATORS
            .iter()
            .position(|candidate| *candidate == symbol)
            .map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        COMPARISON_OPERATORS[self as usize]
    }
}

/// Right-hand side of a `CONSTRAINT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConstraintValue {
    Number(f64),
    Text(String),
}

impl ConstraintValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<f64> for ConstraintValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ConstraintValue {
    fn from(t: &str) -> Self {
        Self::Text(t.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    pub name: String,
    pub op: ComparisonOp,
    pub value: ConstraintValue,
}

// ─────────────────────────────────────────────────────────────────────────────
// Time specifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeKey {
    Deadline,
    Budget,
    Window,
}

impl TimeKey {
    /// Variants in the order of [`TIME_KEYS`].
    const ALL: [Self; 3] = [Self::Deadline, Self::Budget, Self::Window];

    pub fn from_word(word: &str) -> Option<Self> {
        TIME_KEYS
            .iter()
            .position(|candidate| *candidate == word)
            .map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        TIME_KEYS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TimeUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
}

impl TimeUnit {
    /// Variants in the order of [`TIME_UNITS`].
    const ALL: [Self; 4] = [Self::Seconds, Self::Milliseconds, Self::Minutes, Self::Hours];

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        TIME_UNITS
            .iter()
            .position(|candidate| *candidate == suffix)
            .map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        TIME_UNITS[self as usize]
    }

    /// Multiplier that converts one of this unit into seconds.
    pub fn seconds_factor(self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Milliseconds => 0.001,
            Self::Minutes => 60.0,
            Self::Hours => 3600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeSpec {
    pub key: TimeKey,
    pub value: f64,
    pub unit: TimeUnit,
}

impl TimeSpec {
    pub fn seconds(&self) -> f64 {
        self.value * self.unit.seconds_factor()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authority & trust
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityKey {
    User,
    Group,
    Role,
}

impl AuthorityKey {
    /// Variants in the order of [`AUTHORITY_KEYS`].
    const ALL: [Self; 3] = [Self::User, Self::Group, Self::Role];

    pub fn from_word(word: &str) -> Option<Self> {
        AUTHORITY_KEYS
            .iter()
            .position(|candidate| *candidate == word)
            .map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        AUTHORITY_KEYS[self as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Authority {
    pub key: AuthorityKey,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Verified,
    Trusted,
    Untrusted,
    Sandbox,
}

impl TrustLevel {
    /// Variants in the order of [`TRUST_LEVELS`].
    const ALL: [Self; 4] = [Self::Verified, Self::Trusted, Self::Untrusted, Self::Sandbox];

    pub fn from_word(word: &str) -> Option<Self> {
        TRUST_LEVELS
            .iter()
            .position(|candidate| *candidate == word)
            .map(|i| Self::ALL[i])
    }

    pub fn as_str(self) -> &'static str {
        TRUST_LEVELS[self as usize]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware specification
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HARDWARE ONLY and NOT sets overlap on {}", overlap.join(", "))]
pub struct HardwareSpecError {
    pub overlap: Vec<String>,
}

/// `HARDWARE [ONLY ...] [NOT ...]`.  The two sets never intersect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "HardwareSpecRepr")]
pub struct HardwareSpec {
    only: BTreeSet<ClusterType>,
    not: BTreeSet<ClusterType>,
}

#[derive(Deserialize, JsonSchema)]
struct HardwareSpecRepr {
    #[serde(default)]
    only: BTreeSet<ClusterType>,
    #[serde(default)]
    not: BTreeSet<ClusterType>,
}

impl TryFrom<HardwareSpecRepr> for HardwareSpec {
    type Error = HardwareSpecError;

    fn try_from(repr: HardwareSpecRepr) -> Result<Self, Self::Error> {
        Self::new(repr.only, repr.not)
    }
}

impl JsonSchema for HardwareSpec {
    fn schema_name() -> String {
        "HardwareSpec".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        HardwareSpecRepr::json_schema(generator)
    }
}

impl HardwareSpec {
    /// # Errors
    ///
    /// [`HardwareSpecError`] listing the cluster types present in both sets.
    pub fn new(
        only: impl IntoIterator<Item = ClusterType>,
        not: impl IntoIterator<Item = ClusterType>,
    ) -> Result<Self, HardwareSpecError> {
        let only: BTreeSet<ClusterType> = only.into_iter().collect();
        let not: BTreeSet<ClusterType> = not.into_iter().collect();
        let overlap: Vec<String> = only.intersection(&not).map(|c| c.to_string()).collect();
        if !overlap.is_empty() {
            return Err(HardwareSpecError { overlap });
        }
        Ok(Self { only, not })
    }

    pub fn only(&self) -> &BTreeSet<ClusterType> {
        &self.only
    }

    pub fn not(&self) -> &BTreeSet<ClusterType> {
        &self.not
    }

    /// `HARDWARE` with neither clause.
    pub fn is_empty(&self) -> bool {
        self.only.is_empty() && self.not.is_empty()
    }

    /// `ONLY` present → membership required; `NOT` present → membership
    /// forbidden; neither → anything goes.
    pub fn permits(&self, cluster: &ClusterType) -> bool {
        (self.only.is_empty() || self.only.contains(cluster)) && !self.not.contains(cluster)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Intent
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed request for computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Intent {
    name: String,
    objective: String,
    constraints: Vec<Constraint>,
    capabilities: Vec<String>,
    time_specs: Vec<TimeSpec>,
    authorities: Vec<Authority>,
    trust_level: Option<TrustLevel>,
    hardware: Option<HardwareSpec>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Intent {
    /// Start building an intent by hand (tests, programmatic callers).
    pub fn builder(name: impl Into<String>, objective: impl Into<String>) -> IntentBuilder {
        IntentBuilder {
            intent: Intent {
                name: name.into(),
                objective: objective.into(),
                constraints: Vec::new(),
                capabilities: Vec::new(),
                time_specs: Vec::new(),
                authorities: Vec::new(),
                trust_level: None,
                hardware: None,
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn time_specs(&self) -> &[TimeSpec] {
        &self.time_specs
    }

    pub fn authorities(&self) -> &[Authority] {
        &self.authorities
    }

    pub fn trust_level(&self) -> Option<TrustLevel> {
        self.trust_level
    }

    pub fn hardware(&self) -> Option<&HardwareSpec> {
        self.hardware.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// First constraint with `name`.
    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Seconds of the first time specification with `key`.
    pub fn time_seconds(&self, key: TimeKey) -> Option<f64> {
        self.time_specs
            .iter()
            .find(|t| t.key == key)
            .map(TimeSpec::seconds)
    }

    pub fn deadline_seconds(&self) -> Option<f64> {
        self.time_seconds(TimeKey::Deadline)
    }

    pub fn budget_seconds(&self) -> Option<f64> {
        self.time_seconds(TimeKey::Budget)
    }

    pub fn window_seconds(&self) -> Option<f64> {
        self.time_seconds(TimeKey::Window)
    }

    pub fn authorities_for(&self, key: AuthorityKey) -> impl Iterator<Item = &str> {
        self.authorities
            .iter()
            .filter(move |a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// The first `AUTHORITY user:` entry.
    pub fn primary_user_authority(&self) -> Option<&str> {
        self.authorities_for(AuthorityKey::User).next()
    }

    /// `true` when a `HARDWARE ONLY` clause names `cluster`.
    pub fn requires_cluster(&self, cluster: &ClusterType) -> bool {
        self.hardware
            .as_ref()
            .is_some_and(|h| h.only.contains(cluster))
    }

    /// `true` when a `HARDWARE NOT` clause names `cluster`.
    pub fn excludes_cluster(&self, cluster: &ClusterType) -> bool {
        self.hardware
            .as_ref()
            .is_some_and(|h| h.not.contains(cluster))
    }

    /// Whether the hardware specification (if any) allows `cluster`.
    pub fn permits_cluster(&self, cluster: &ClusterType) -> bool {
        self.hardware.as_ref().is_none_or(|h| h.permits(cluster))
    }
}

/// Incremental constructor for [`Intent`].
#[derive(Debug, Clone)]
pub struct IntentBuilder {
    intent: Intent,
}

impl IntentBuilder {
    pub fn constraint(
        mut self,
        name: impl Into<String>,
        op: ComparisonOp,
        value: impl Into<ConstraintValue>,
    ) -> Self {
        self.intent.constraints.push(Constraint {
            name: name.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn capability(mut self, name: impl Into<String>) -> Self {
        self.intent.capabilities.push(name.into());
        self
    }

    pub fn time(mut self, key: TimeKey, value: f64, unit: TimeUnit) -> Self {
        self.intent.time_specs.push(TimeSpec { key, value, unit });
        self
    }

    pub fn authority(mut self, key: AuthorityKey, value: impl Into<String>) -> Self {
        self.intent.authorities.push(Authority {
            key,
            value: value.into(),
        });
        self
    }

    pub fn trust(mut self, level: TrustLevel) -> Self {
        self.intent.trust_level = Some(level);
        self
    }

    pub fn hardware(mut self, spec: HardwareSpec) -> Self {
        self.intent.hardware = Some(spec);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.intent.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Intent {
        self.intent
    }
}
