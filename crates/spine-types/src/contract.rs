//! The four coupled contracts an authorized intent is turned into.
//!
//! Each contract identifies itself by the SHA-256 of its canonical JSON with
//! the `contract_id` field removed, so any edit after issuance is detectable
//! with [`ContractBundle::verify_ids`].  The [`IntentContract`] is the anchor:
//! every other contract carries its id in `intent_contract_id`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SpineError;
use crate::cluster::ClusterType;
use crate::event::EventType;
use crate::hashing::content_id;

/// Type discriminator carried by every contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Intent,
    Capability,
    Temporal,
    Event,
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Intent => "intent",
            Self::Capability => "capability",
            Self::Temporal => "temporal",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// Derive and store the content id of a freshly built contract.
macro_rules! seal_contract {
    ($contract:expr) => {{
        let mut contract = $contract;
        contract.contract_id = content_id(&contract, "contract_id")?;
        Ok(contract)
    }};
}

/// Shared id check for all four contract kinds.
fn check_id<T: Serialize>(contract: &T, stored: &str, kind: ContractType) -> Result<(), SpineError> {
    let expected = content_id(contract, "contract_id")?;
    if expected == stored {
        Ok(())
    } else {
        Err(SpineError::ContractTampered {
            contract_type: kind.to_string(),
            contract_id: stored.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IntentContract
// ─────────────────────────────────────────────────────────────────────────────

/// Anchor contract: what was asked for and the proof that it was allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentContract {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub created_at: DateTime<Utc>,
    pub intent_name: String,
    pub objective: String,
    /// Names of the resolved capabilities, in resolution order.
    pub capabilities: Vec<String>,
    /// Canonical hash of the source intent.
    pub intent_hash: String,
    pub authorization_proof: String,
}

impl IntentContract {
    /// # Errors
    ///
    /// [`SpineError::Serialization`] if the contract cannot be canonicalized.
    pub fn issue(
        intent_name: impl Into<String>,
        objective: impl Into<String>,
        capabilities: Vec<String>,
        intent_hash: impl Into<String>,
        authorization_proof: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SpineError> {
        seal_contract!(Self {
            contract_id: String::new(),
            contract_type: ContractType::Intent,
            created_at,
            intent_name: intent_name.into(),
            objective: objective.into(),
            capabilities,
            intent_hash: intent_hash.into(),
            authorization_proof: authorization_proof.into(),
        })
    }

    /// # Errors
    ///
    /// [`SpineError::ContractTampered`] when the stored id no longer matches.
    pub fn verify_id(&self) -> Result<(), SpineError> {
        check_id(self, &self.contract_id, self.contract_type)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CapabilityContract
// ─────────────────────────────────────────────────────────────────────────────

/// Physical shape of the cluster a capability is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub cluster_type: ClusterType,
    pub node_count: u32,
    pub accelerators_per_node: u32,
    pub memory_per_node_gb: u32,
    pub interconnect: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ClusterTopology {
    /// Template used for cluster types with no registered topology.
    pub fn generic(cluster_type: ClusterType) -> Self {
        Self {
            cluster_type,
            node_count: 1,
            accelerators_per_node: 1,
            memory_per_node_gb: 64,
            interconnect: "generic".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn total_accelerators(&self) -> u32 {
        self.node_count.saturating_mul(self.accelerators_per_node)
    }
}

/// Binds the intent to concrete hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityContract {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub created_at: DateTime<Utc>,
    pub intent_contract_id: String,
    pub topology: ClusterTopology,
    /// Requirement map of every resolved capability, keyed by capability name.
    pub allocated_resources: BTreeMap<String, BTreeMap<String, Value>>,
    pub capability_proof: String,
}

impl CapabilityContract {
    /// # Errors
    ///
    /// [`SpineError::Serialization`] if the contract cannot be canonicalized.
    pub fn issue(
        intent_contract_id: impl Into<String>,
        topology: ClusterTopology,
        allocated_resources: BTreeMap<String, BTreeMap<String, Value>>,
        capability_proof: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SpineError> {
        seal_contract!(Self {
            contract_id: String::new(),
            contract_type: ContractType::Capability,
            created_at,
            intent_contract_id: intent_contract_id.into(),
            topology,
            allocated_resources,
            capability_proof: capability_proof.into(),
        })
    }

    pub fn cluster_type(&self) -> &ClusterType {
        &self.topology.cluster_type
    }

    /// # Errors
    ///
    /// [`SpineError::ContractTampered`] when the stored id no longer matches.
    pub fn verify_id(&self) -> Result<(), SpineError> {
        check_id(self, &self.contract_id, self.contract_type)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TemporalContract
// ─────────────────────────────────────────────────────────────────────────────

/// Absolute interval in which execution may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExecutionWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// When the work must be done by, and whether it may be rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContract {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub created_at: DateTime<Utc>,
    pub intent_contract_id: String,
    pub deadline_seconds: f64,
    pub budget_seconds: Option<f64>,
    pub execution_window: Option<ExecutionWindow>,
    pub rollback_authorized: bool,
    pub temporal_proof: String,
}

impl TemporalContract {
    /// # Errors
    ///
    /// [`SpineError::Serialization`] if the deadline or budget is not finite,
    /// or the contract cannot be canonicalized.
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        intent_contract_id: impl Into<String>,
        deadline_seconds: f64,
        budget_seconds: Option<f64>,
        execution_window: Option<ExecutionWindow>,
        rollback_authorized: bool,
        temporal_proof: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SpineError> {
        if !deadline_seconds.is_finite() || budget_seconds.is_some_and(|b| !b.is_finite()) {
            return Err(SpineError::Serialization(format!(
                "temporal contract needs finite seconds, got deadline {deadline_seconds} \
                 and budget {budget_seconds:?}"
            )));
        }
        seal_contract!(Self {
            contract_id: String::new(),
            contract_type: ContractType::Temporal,
            created_at,
            intent_contract_id: intent_contract_id.into(),
            deadline_seconds,
            budget_seconds,
            execution_window,
            rollback_authorized,
            temporal_proof: temporal_proof.into(),
        })
    }

    /// `created_at + deadline_seconds`, millisecond resolution.
    pub fn deadline_at(&self) -> DateTime<Utc> {
        self.created_at + seconds_to_duration(self.deadline_seconds)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Seconds left before the deadline; negative once expired.
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> f64 {
        (self.deadline_at() - now).num_milliseconds() as f64 / 1000.0
    }

    /// # Errors
    ///
    /// [`SpineError::ContractTampered`] when the stored id no longer matches.
    pub fn verify_id(&self) -> Result<(), SpineError> {
        check_id(self, &self.contract_id, self.contract_type)
    }
}

/// Convert fractional seconds to a [`Duration`], clamping absurd values.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    const MAX_MILLIS: f64 = 1.0e15;
    let millis = (seconds * 1000.0).clamp(-MAX_MILLIS, MAX_MILLIS);
    Duration::milliseconds(millis.round() as i64)
}

// ─────────────────────────────────────────────────────────────────────────────
// EventContract
// ─────────────────────────────────────────────────────────────────────────────

/// A permitted `from → to` step between two consecutive events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CausalTransition {
    pub from: EventType,
    pub to: EventType,
}

/// The event ordering the execution must follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContract {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub created_at: DateTime<Utc>,
    pub intent_contract_id: String,
    pub expected_events: Vec<EventType>,
    pub causal_transitions: BTreeSet<CausalTransition>,
    pub event_proof: String,
}

impl EventContract {
    /// Build the contract; the transition set is every adjacent pair of
    /// `expected_events`.
    ///
    /// # Errors
    ///
    /// [`SpineError::Serialization`] if the contract cannot be canonicalized.
    pub fn issue(
        intent_contract_id: impl Into<String>,
        expected_events: Vec<EventType>,
        event_proof: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SpineError> {
        let causal_transitions = adjacent_transitions(&expected_events);
        seal_contract!(Self {
            contract_id: String::new(),
            contract_type: ContractType::Event,
            created_at,
            intent_contract_id: intent_contract_id.into(),
            expected_events,
            causal_transitions,
            event_proof: event_proof.into(),
        })
    }

    pub fn permits(&self, from: &EventType, to: &EventType) -> bool {
        self.causal_transitions.contains(&CausalTransition {
            from: from.clone(),
            to: to.clone(),
        })
    }

    /// Check an observed sequence of event types step by step.
    ///
    /// Returns one message per consecutive pair that is not a permitted
    /// transition; an empty list means the sequence conforms.  A sequence
    /// may start anywhere in the expected order.
    pub fn sequence_violations(&self, observed: &[EventType]) -> Vec<String> {
        let mut violations = Vec::new();
        if let Some(first) = observed.first()
            && !self.expected_events.contains(first)
        {
            violations.push(format!("unexpected first event {first}"));
        }
        for pair in observed.windows(2) {
            if !self.permits(&pair[0], &pair[1]) {
                violations.push(format!("transition {} -> {} not permitted", pair[0], pair[1]));
            }
        }
        violations
    }

    /// # Errors
    ///
    /// [`SpineError::ContractTampered`] when the stored id no longer matches.
    pub fn verify_id(&self) -> Result<(), SpineError> {
        check_id(self, &self.contract_id, self.contract_type)
    }
}

/// Transition set made of every adjacent pair in `sequence`.
pub fn adjacent_transitions(sequence: &[EventType]) -> BTreeSet<CausalTransition> {
    sequence
        .windows(2)
        .map(|pair| CausalTransition {
            from: pair[0].clone(),
            to: pair[1].clone(),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// ContractBundle
// ─────────────────────────────────────────────────────────────────────────────

/// The four contracts issued for one authorized intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractBundle {
    pub intent: IntentContract,
    pub capability: CapabilityContract,
    pub temporal: TemporalContract,
    pub event: EventContract,
}

impl ContractBundle {
    /// Id of the anchor [`IntentContract`].
    pub fn anchor_id(&self) -> &str {
        &self.intent.contract_id
    }

    pub fn cluster_type(&self) -> &ClusterType {
        self.capability.cluster_type()
    }

    /// Check that every dependent contract references the anchor.
    ///
    /// # Errors
    ///
    /// [`SpineError::ReferenceMismatch`] naming the first offending contract.
    pub fn validate_references(&self) -> Result<(), SpineError> {
        let anchor = self.anchor_id();
        let references = [
            (ContractType::Capability, &self.capability.intent_contract_id),
            (ContractType::Temporal, &self.temporal.intent_contract_id),
            (ContractType::Event, &self.event.intent_contract_id),
        ];
        for (kind, reference) in references {
            if reference != anchor {
                return Err(SpineError::ReferenceMismatch {
                    contract_type: kind.to_string(),
                    expected: anchor.to_string(),
                    found: reference.clone(),
                });
            }
        }
        Ok(())
    }

    /// Recompute every contract id.
    ///
    /// # Errors
    ///
    /// [`SpineError::ContractTampered`] for the first contract whose content
    /// no longer matches its id.
    pub fn verify_ids(&self) -> Result<(), SpineError> {
        self.intent.verify_id()?;
        self.capability.verify_id()?;
        self.temporal.verify_id()?;
        self.event.verify_id()
    }

    /// # Errors
    ///
    /// [`SpineError::TemporalExpired`] when `now` is past the deadline.
    pub fn check_not_expired(&self, now: DateTime<Utc>) -> Result<(), SpineError> {
        if self.temporal.is_expired_at(now) {
            return Err(SpineError::TemporalExpired {
                contract_id: self.temporal.contract_id.clone(),
                deadline: self.temporal.deadline_at().to_rfc3339(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_at(created_at: DateTime<Utc>, deadline_seconds: f64) -> ContractBundle {
        let intent = IntentContract::issue(
            "train",
            "fit",
            vec!["llm_training".to_string()],
            "hash",
            "proof",
            created_at,
        )
        .unwrap();
        let anchor = intent.contract_id.clone();
        let capability = CapabilityContract::issue(
            &anchor,
            ClusterTopology::generic(ClusterType::Gb200),
            BTreeMap::new(),
            "cap-proof",
            created_at,
        )
        .unwrap();
        let temporal = TemporalContract::issue(
            &anchor,
            deadline_seconds,
            None,
            None,
            true,
            "t-proof",
            created_at,
        )
        .unwrap();
        let event = EventContract::issue(
            &anchor,
            EventType::DEFAULT_SEQUENCE.to_vec(),
            "e-proof",
            created_at,
        )
        .unwrap();
        ContractBundle {
            intent,
            capability,
            temporal,
            event,
        }
    }

    #[test]
    fn temporal_contract_requires_finite_seconds() {
        let now = Utc::now();
        for (deadline, budget) in [(f64::INFINITY, None), (60.0, Some(f64::NAN))] {
            let err = TemporalContract::issue("anchor", deadline, budget, None, true, "p", now)
                .unwrap_err();
            assert!(matches!(err, SpineError::Serialization(_)));
        }
        assert!(TemporalContract::issue("anchor", 60.0, Some(30.0), None, true, "p", now).is_ok());
    }

    #[test]
    fn freshly_issued_bundle_is_consistent() {
        let bundle = bundle_at(Utc::now(), 60.0);
        assert!(bundle.validate_references().is_ok());
        assert!(bundle.verify_ids().is_ok());
        assert!(bundle.check_not_expired(Utc::now()).is_ok());
    }

    #[test]
    fn foreign_reference_is_rejected() {
        let mut bundle = bundle_at(Utc::now(), 60.0);
        bundle.temporal.intent_contract_id = "foreign".to_string();
        match bundle.validate_references() {
            Err(SpineError::ReferenceMismatch {
                contract_type,
                found,
                ..
            }) => {
                assert_eq!(contract_type, "temporal");
                assert_eq!(found, "foreign");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn edited_contract_fails_id_check() {
        let mut bundle = bundle_at(Utc::now(), 60.0);
        bundle.capability.topology.node_count = 99;
        assert!(matches!(
            bundle.verify_ids(),
            Err(SpineError::ContractTampered { .. })
        ));
    }

    #[test]
    fn contract_ids_differ_across_kinds() {
        let bundle = bundle_at(Utc::now(), 60.0);
        let ids: BTreeSet<&str> = [
            bundle.intent.contract_id.as_str(),
            bundle.capability.contract_id.as_str(),
            bundle.temporal.contract_id.as_str(),
            bundle.event.contract_id.as_str(),
        ]
        .into_iter()
        .collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn temporal_contract_expires_after_deadline() {
        let created = Utc::now() - Duration::seconds(5);
        let bundle = bundle_at(created, 1.0);
        assert!(bundle.temporal.is_expired());
        assert!(matches!(
            bundle.check_not_expired(Utc::now()),
            Err(SpineError::TemporalExpired { .. })
        ));
        // Exactly at the deadline is still valid.
        assert!(!bundle.temporal.is_expired_at(bundle.temporal.deadline_at()));
    }

    #[test]
    fn default_sequence_transitions_are_adjacent_pairs() {
        let bundle = bundle_at(Utc::now(), 60.0);
        let event = &bundle.event;
        assert_eq!(event.causal_transitions.len(), 6);
        assert!(event.permits(&EventType::IntentReceived, &EventType::IntentAuthorized));
        assert!(!event.permits(&EventType::IntentReceived, &EventType::AuditLogged));
    }

    #[test]
    fn sequence_violations_accept_suffix_and_flag_skips() {
        let bundle = bundle_at(Utc::now(), 60.0);
        let suffix = [
            EventType::ContractsIssued,
            EventType::CapabilityBound,
            EventType::ExecutionStarted,
        ];
        assert!(bundle.event.sequence_violations(&suffix).is_empty());

        let skipped = [EventType::ContractsIssued, EventType::ExecutionCompleted];
        assert_eq!(bundle.event.sequence_violations(&skipped).len(), 1);
    }
}
