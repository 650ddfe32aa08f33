//! [`ContractIssuer`] – turns an authorized intent and its resolved
//! capabilities into a [`ContractBundle`].
//!
//! Issuance is strictly ordered: the anchor [`IntentContract`] first, then
//! the capability, temporal and event contracts, each referencing the
//! anchor's id.  All four share one creation timestamp.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use spine_kernel::AuthorizationResult;
use spine_lang::Intent;
use spine_types::contract::seconds_to_duration;
use spine_types::hashing::hash_canonical;
use spine_types::{
    CapabilityContract, ClusterTopology, ClusterType, ContractBundle, EventContract, EventType,
    ExecutionWindow, IntentContract, SpineError, TemporalContract,
};
use tracing::info;

use crate::resolver::ResolvedCapability;

/// Deadline applied when an intent gives neither `deadline` nor `budget`.
pub const DEFAULT_DEADLINE_SECONDS: f64 = 3600.0;

/// Issues contract bundles; holds the topology templates per cluster type.
pub struct ContractIssuer {
    topologies: RwLock<HashMap<ClusterType, ClusterTopology>>,
}

impl Default for ContractIssuer {
    /// An issuer with templates for every built-in cluster type.
    fn default() -> Self {
        let templates = [
            (ClusterType::Gb200, 18, 4, 768, "NVLink5"),
            (ClusterType::Mi300x, 1, 8, 1536, "Infinity Fabric"),
            (ClusterType::Qpu, 1, 1, 64, "cryogenic-control"),
            (ClusterType::Ipu, 1, 4, 256, "IPU-Link"),
            (ClusterType::Gaudi3, 1, 8, 1024, "RoCE v2"),
            (ClusterType::Cpu, 1, 0, 512, "Ethernet"),
            (ClusterType::Cerebras, 1, 1, 1200, "SwarmX"),
        ];
        let topologies = templates
            .into_iter()
            .map(|(cluster_type, nodes, accelerators, memory, interconnect)| {
                let topology = ClusterTopology {
                    cluster_type: cluster_type.clone(),
                    node_count: nodes,
                    accelerators_per_node: accelerators,
                    memory_per_node_gb: memory,
                    interconnect: interconnect.to_string(),
                    metadata: BTreeMap::new(),
                };
                (cluster_type, topology)
            })
            .collect();
        Self {
            topologies: RwLock::new(topologies),
        }
    }
}

impl ContractIssuer {
    /// Register (or replace) the template for `topology.cluster_type`.
    pub fn register_topology(&self, topology: ClusterTopology) {
        self.topologies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topology.cluster_type.clone(), topology);
    }

    /// The template for `cluster`, or [`ClusterTopology::generic`].
    pub fn topology_for(&self, cluster: &ClusterType) -> ClusterTopology {
        self.topologies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cluster)
            .cloned()
            .unwrap_or_else(|| ClusterTopology::generic(cluster.clone()))
    }

    /// [`ContractIssuer::issue_at`] with the current time.
    ///
    /// # Errors
    ///
    /// See [`ContractIssuer::issue_at`].
    pub fn issue(
        &self,
        intent: &Intent,
        authorization: &AuthorizationResult,
        resolved: &[ResolvedCapability],
    ) -> Result<ContractBundle, SpineError> {
        self.issue_at(intent, authorization, resolved, Utc::now())
    }

    /// Build the four contracts for `intent`, all created at `now`.
    ///
    /// # Errors
    ///
    /// - [`SpineError::UnauthorizedIssuance`] – `authorization` is not a
    ///   grant for this intent (non-fatal; authorize first).
    /// - [`SpineError::Issuance`] – no capability was resolved.
    /// - [`SpineError::Serialization`] – a contract could not be hashed.
    pub fn issue_at(
        &self,
        intent: &Intent,
        authorization: &AuthorizationResult,
        resolved: &[ResolvedCapability],
        now: DateTime<Utc>,
    ) -> Result<ContractBundle, SpineError> {
        let granted = authorization.authorized
            && !authorization.proof.is_empty()
            && authorization.intent_name == intent.name()
            && authorization.intent_hash == spine_lang::intent_hash(intent)?;
        if !granted {
            return Err(SpineError::UnauthorizedIssuance(intent.name().to_string()));
        }
        let Some(primary) = resolved.first() else {
            return Err(SpineError::Issuance(format!(
                "no capabilities resolved for intent '{}'",
                intent.name()
            )));
        };

        // (a) anchor
        let intent_contract = IntentContract::issue(
            intent.name(),
            intent.objective(),
            resolved.iter().map(|r| r.name.clone()).collect(),
            authorization.intent_hash.clone(),
            authorization.proof.clone(),
            now,
        )?;
        let anchor = intent_contract.contract_id.clone();

        // (b) capability
        let topology = self.topology_for(&primary.cluster_type);
        let allocated_resources: BTreeMap<String, BTreeMap<String, Value>> = resolved
            .iter()
            .map(|r| (r.name.clone(), r.requirements.clone()))
            .collect();
        let capability_proof = hash_canonical(&json!({
            "intent_contract_id": anchor,
            "resolved": resolved,
        }))?;
        let capability = CapabilityContract::issue(
            &anchor,
            topology,
            allocated_resources,
            capability_proof,
            now,
        )?;

        // (c) temporal
        let deadline_seconds = intent
            .deadline_seconds()
            .or_else(|| intent.budget_seconds())
            .unwrap_or(DEFAULT_DEADLINE_SECONDS);
        let budget_seconds = intent.budget_seconds();
        let execution_window = intent.window_seconds().map(|window| ExecutionWindow {
            start: now,
            end: now + seconds_to_duration(window),
        });
        let temporal_proof = hash_canonical(&json!({
            "intent_contract_id": anchor,
            "deadline_seconds": deadline_seconds,
            "budget_seconds": budget_seconds,
            "window_seconds": intent.window_seconds(),
        }))?;
        let temporal = TemporalContract::issue(
            &anchor,
            deadline_seconds,
            budget_seconds,
            execution_window,
            true,
            temporal_proof,
            now,
        )?;

        // (d) event
        let expected_events = EventType::DEFAULT_SEQUENCE.to_vec();
        let event_proof = hash_canonical(&json!({
            "intent_contract_id": anchor,
            "expected_events": expected_events,
        }))?;
        let event = EventContract::issue(&anchor, expected_events, event_proof, now)?;

        info!(
            intent = intent.name(),
            contract_id = %anchor,
            cluster = %primary.cluster_type,
            deadline_seconds,
            "contracts issued"
        );

        Ok(ContractBundle {
            intent: intent_contract,
            capability,
            temporal,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CapabilityResolver;
    use spine_kernel::AuthorizationEngine;
    use spine_lang::parse;

    fn prepared(source: &str) -> (Intent, AuthorizationResult, Vec<ResolvedCapability>) {
        let intent = parse(source).unwrap();
        let auth = AuthorizationEngine::default().authorize(&intent).unwrap();
        let resolved = CapabilityResolver::default().resolve(&intent).unwrap();
        (intent, auth, resolved)
    }

    #[test]
    fn bundle_references_the_anchor() {
        let (intent, auth, resolved) = prepared(
            "INTENT job { OBJECTIVE train CAPABILITY llm_training AUTHORITY user: alice }",
        );
        let bundle = ContractIssuer::default().issue(&intent, &auth, &resolved).unwrap();
        assert!(bundle.validate_references().is_ok());
        assert!(bundle.verify_ids().is_ok());
        assert_eq!(bundle.intent.authorization_proof, auth.proof);
        assert_eq!(bundle.intent.capabilities, vec!["llm_training"]);
        assert_eq!(bundle.cluster_type(), &ClusterType::Gb200);
        assert_eq!(bundle.capability.topology.node_count, 18);
        assert!(bundle.capability.allocated_resources.contains_key("llm_training"));
    }

    #[test]
    fn temporal_defaults_and_fallbacks() {
        let issuer = ContractIssuer::default();

        let (intent, auth, resolved) = prepared("INTENT a { OBJECTIVE o AUTHORITY user: u }");
        let bundle = issuer.issue(&intent, &auth, &resolved).unwrap();
        assert_eq!(bundle.temporal.deadline_seconds, DEFAULT_DEADLINE_SECONDS);
        assert!(bundle.temporal.rollback_authorized);
        assert!(bundle.temporal.budget_seconds.is_none());

        let (intent, auth, resolved) =
            prepared("INTENT b { OBJECTIVE o TIME budget: 10m AUTHORITY user: u }");
        let bundle = issuer.issue(&intent, &auth, &resolved).unwrap();
        assert_eq!(bundle.temporal.deadline_seconds, 600.0);
        assert_eq!(bundle.temporal.budget_seconds, Some(600.0));

        let (intent, auth, resolved) = prepared(
            "INTENT c { OBJECTIVE o TIME deadline: 30s TIME budget: 10m TIME window: 1h \
             AUTHORITY user: u }",
        );
        let now = Utc::now();
        let bundle = issuer.issue_at(&intent, &auth, &resolved, now).unwrap();
        assert_eq!(bundle.temporal.deadline_seconds, 30.0);
        let window = bundle.temporal.execution_window.unwrap();
        assert_eq!(window.start, now);
        assert_eq!((window.end - window.start).num_seconds(), 3600);
    }

    #[test]
    fn event_contract_carries_default_sequence() {
        let (intent, auth, resolved) = prepared("INTENT a { OBJECTIVE o AUTHORITY user: u }");
        let bundle = ContractIssuer::default().issue(&intent, &auth, &resolved).unwrap();
        assert_eq!(bundle.event.expected_events, EventType::DEFAULT_SEQUENCE.to_vec());
        assert_eq!(bundle.event.causal_transitions.len(), 6);
        assert!(bundle.event.permits(&EventType::ExecutionStarted, &EventType::ExecutionCompleted));
    }

    #[test]
    fn denied_authorization_cannot_issue() {
        let intent = parse("INTENT a { OBJECTIVE o AUTHORITY user: u }").unwrap();
        let (_, mut auth, resolved) = prepared("INTENT a { OBJECTIVE o AUTHORITY user: u }");
        auth.authorized = false;
        let err = ContractIssuer::default()
            .issue(&intent, &auth, &resolved)
            .unwrap_err();
        assert_eq!(err, SpineError::UnauthorizedIssuance("a".to_string()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn grant_for_a_different_intent_cannot_issue() {
        let (_, auth, resolved) = prepared("INTENT a { OBJECTIVE o AUTHORITY user: u }");
        let edited = parse("INTENT a { OBJECTIVE other AUTHORITY user: u }").unwrap();
        assert!(matches!(
            ContractIssuer::default().issue(&edited, &auth, &resolved),
            Err(SpineError::UnauthorizedIssuance(_))
        ));
    }

    #[test]
    fn no_capabilities_is_fatal() {
        let (intent, auth, _) = prepared("INTENT a { OBJECTIVE o AUTHORITY user: u }");
        let err = ContractIssuer::default().issue(&intent, &auth, &[]).unwrap_err();
        assert!(matches!(err, SpineError::Issuance(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn custom_topologies_and_generic_fallback() {
        let issuer = ContractIssuer::default();
        let tpu = ClusterType::Custom("TPU_V5".to_string());
        assert_eq!(issuer.topology_for(&tpu), ClusterTopology::generic(tpu.clone()));

        issuer.register_topology(ClusterTopology {
            node_count: 4,
            accelerators_per_node: 8,
            ..ClusterTopology::generic(tpu.clone())
        });
        assert_eq!(issuer.topology_for(&tpu).total_accelerators(), 32);
    }
}
