//! [`ExecutionSpine`] – validates a contract bundle, dispatches it to the
//! adapter for its cluster type and records the lifecycle in the ledger.
//!
//! Order of a dispatch:
//!
//! 1. sub-contract references match the anchor;
//! 2. every contract id matches its content;
//! 3. the temporal contract has not expired;
//! 4. adapter lookup (registered, or simulated when the spine has no
//!    registry) and the adapter's own `validate_contract`;
//! 5. `ExecutionStarted`, dispatch, `ExecutionCompleted`, `AuditLogged`.
//!
//! Any failure appends `ExecutionFailed` to the anchor chain before the
//! error is returned.  No adapter is touched before steps 1–3 pass, and no
//! dispatch is retried.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;
use spine_hal::{AdapterRegistry, ExecutionAdapter, SimulatedAdapter};
use spine_ledger::EventLog;
use spine_types::{ContractBundle, EventData, EventType, ExecutionResult, SpineError};
use tracing::{info, warn};

/// Dispatches bundles and caches results per anchor contract id.
pub struct ExecutionSpine {
    ledger: Arc<EventLog>,
    registry: Option<AdapterRegistry>,
    results: RwLock<HashMap<String, ExecutionResult>>,
}

impl ExecutionSpine {
    /// A spine without a registry: every bundle runs on a
    /// [`SimulatedAdapter`] for its cluster type.
    pub fn simulated(ledger: Arc<EventLog>) -> Self {
        Self {
            ledger,
            registry: None,
            results: RwLock::new(HashMap::new()),
        }
    }

    /// A spine that dispatches only to adapters in `registry`.
    pub fn with_registry(ledger: Arc<EventLog>, registry: AdapterRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..Self::simulated(ledger)
        }
    }

    pub fn ledger(&self) -> &Arc<EventLog> {
        &self.ledger
    }

    /// [`ExecutionSpine::execute_at`] with the current time.
    ///
    /// # Errors
    ///
    /// See [`ExecutionSpine::execute_at`].
    pub fn execute(&self, bundle: &ContractBundle) -> Result<ExecutionResult, SpineError> {
        self.execute_at(bundle, Utc::now())
    }

    /// Validate and dispatch `bundle`, treating `now` as the current time
    /// for the expiry check.
    ///
    /// # Errors
    ///
    /// - [`SpineError::ReferenceMismatch`], [`SpineError::ContractTampered`],
    ///   [`SpineError::TemporalExpired`] – rejected before any adapter call.
    /// - [`SpineError::AdapterMissing`] – registry has no adapter for the
    ///   bundle's cluster type.
    /// - [`SpineError::ClusterMismatch`] or any error the adapter's
    ///   validation or execution returns.
    pub fn execute_at(
        &self,
        bundle: &ContractBundle,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult, SpineError> {
        let anchor = bundle.anchor_id();
        self.dispatch(bundle, now).inspect_err(|e| {
            warn!(contract_id = anchor, error = %e, "execution failed");
            let payload = EventData::from([
                ("error_kind".to_string(), json!(e.kind())),
                ("error".to_string(), json!(e.to_string())),
                ("cluster_type".to_string(), json!(bundle.cluster_type())),
            ]);
            if let Err(log_err) = self.ledger.log_event(EventType::ExecutionFailed, anchor, payload)
            {
                warn!(contract_id = anchor, error = %log_err, "failure event not recorded");
            }
        })
    }

    fn dispatch(
        &self,
        bundle: &ContractBundle,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult, SpineError> {
        bundle.validate_references()?;
        bundle.verify_ids()?;
        bundle.check_not_expired(now)?;

        let cluster = bundle.cluster_type();
        let simulated;
        let (adapter, mode): (&dyn ExecutionAdapter, &str) = match &self.registry {
            Some(registry) => (
                registry
                    .get(cluster)
                    .ok_or_else(|| SpineError::AdapterMissing(cluster.to_string()))?,
                "registered",
            ),
            None => {
                simulated = SimulatedAdapter::new(cluster.clone());
                (&simulated as &dyn ExecutionAdapter, "simulated")
            }
        };
        adapter.validate_contract(bundle)?;

        let anchor = bundle.anchor_id();
        self.ledger.log_event(
            EventType::ExecutionStarted,
            anchor,
            EventData::from([
                ("cluster_type".to_string(), json!(cluster)),
                ("adapter".to_string(), json!(mode)),
                (
                    "deadline_at".to_string(),
                    json!(bundle.temporal.deadline_at().to_rfc3339()),
                ),
                (
                    "remaining_seconds".to_string(),
                    json!(bundle.temporal.remaining_seconds_at(now)),
                ),
            ]),
        )?;

        let result = adapter.execute(bundle)?;
        if !result.success {
            return Err(SpineError::Execution {
                cluster: cluster.to_string(),
                details: "adapter reported an unsuccessful run".to_string(),
            });
        }

        self.ledger.log_event(
            EventType::ExecutionCompleted,
            anchor,
            EventData::from([
                ("success".to_string(), json!(result.success)),
                ("execution_seconds".to_string(), json!(result.execution_seconds)),
                ("proof_id".to_string(), json!(result.proof.proof_id)),
                ("result_hash".to_string(), json!(result.proof.result_hash)),
                ("deterministic".to_string(), json!(result.proof.deterministic)),
            ]),
        )?;
        self.ledger.log_event(
            EventType::AuditLogged,
            anchor,
            EventData::from([
                ("intent_name".to_string(), json!(bundle.intent.intent_name)),
                ("cluster_type".to_string(), json!(cluster)),
                ("proof_id".to_string(), json!(result.proof.proof_id)),
            ]),
        )?;

        info!(
            contract_id = anchor,
            cluster = %cluster,
            seconds = result.execution_seconds,
            "execution completed"
        );
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(anchor.to_string(), result.clone());
        Ok(result)
    }

    /// Cached result of a completed execution.
    pub fn result(&self, contract_id: &str) -> Option<ExecutionResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(contract_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::ContractIssuer;
    use crate::resolver::CapabilityResolver;
    use chrono::Duration;
    use spine_hal::SimRegistry;
    use spine_kernel::AuthorizationEngine;
    use spine_lang::parse;
    use spine_types::ClusterType;

    fn bundle_for(source: &str, created_at: DateTime<Utc>) -> ContractBundle {
        let intent = parse(source).unwrap();
        let auth = AuthorizationEngine::default().authorize(&intent).unwrap();
        let resolved = CapabilityResolver::default().resolve(&intent).unwrap();
        ContractIssuer::default()
            .issue_at(&intent, &auth, &resolved, created_at)
            .unwrap()
    }

    const SOURCE: &str = "INTENT job { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }";

    /// Registers a simulated adapter the test keeps a handle on, so its
    /// execution count can be read after the spine owns the registry.
    struct SharedAdapter(Arc<SimulatedAdapter>);

    impl ExecutionAdapter for SharedAdapter {
        fn cluster_type(&self) -> ClusterType {
            self.0.cluster_type()
        }

        fn execute(&self, bundle: &ContractBundle) -> Result<ExecutionResult, SpineError> {
            self.0.execute(bundle)
        }
    }

    fn counting_spine(
        ledger: &Arc<EventLog>,
        cluster: ClusterType,
    ) -> (ExecutionSpine, Arc<SimulatedAdapter>) {
        let adapter = Arc::new(SimulatedAdapter::new(cluster));
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(SharedAdapter(Arc::clone(&adapter))));
        (ExecutionSpine::with_registry(Arc::clone(ledger), registry), adapter)
    }

    #[test]
    fn simulated_execution_logs_full_lifecycle() {
        let ledger = Arc::new(EventLog::new());
        let spine = ExecutionSpine::simulated(Arc::clone(&ledger));
        let bundle = bundle_for(SOURCE, Utc::now());

        let result = spine.execute(&bundle).unwrap();
        assert!(result.success);
        assert_eq!(result.cluster_type, ClusterType::Gb200);
        assert_eq!(
            ledger.event_types_for(bundle.anchor_id()),
            vec![
                EventType::ExecutionStarted,
                EventType::ExecutionCompleted,
                EventType::AuditLogged
            ]
        );
        assert!(ledger.verify_chain(bundle.anchor_id()).is_ok());
        assert_eq!(spine.result(bundle.anchor_id()), Some(result));
    }

    #[test]
    fn foreign_reference_is_rejected_before_any_adapter_call() {
        let ledger = Arc::new(EventLog::new());
        let (spine, adapter) = counting_spine(&ledger, ClusterType::Gb200);
        let mut bundle = bundle_for(SOURCE, Utc::now());
        bundle.event.intent_contract_id = "foreign".to_string();

        let err = spine.execute(&bundle).unwrap_err();
        assert!(matches!(err, SpineError::ReferenceMismatch { .. }));
        assert_eq!(adapter.executions(), 0);
        assert_eq!(
            ledger.event_types_for(bundle.anchor_id()),
            vec![EventType::ExecutionFailed]
        );
        assert!(spine.result(bundle.anchor_id()).is_none());
    }

    #[test]
    fn expired_temporal_contract_is_fatal() {
        let ledger = Arc::new(EventLog::new());
        let source = "INTENT job { OBJECTIVE o TIME deadline: 1s AUTHORITY user: alice }";
        let created = Utc::now();
        let bundle = bundle_for(source, created);
        let (spine, adapter) = counting_spine(&ledger, bundle.cluster_type().clone());

        let err = spine
            .execute_at(&bundle, created + Duration::seconds(2))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SpineError::TemporalExpired { .. }));
        assert_eq!(adapter.executions(), 0);

        assert!(spine.execute_at(&bundle, created).is_ok());
        assert_eq!(adapter.executions(), 1);
    }

    #[test]
    fn simulated_mode_rejects_expired_contract() {
        let spine = ExecutionSpine::simulated(Arc::new(EventLog::new()));
        let created = Utc::now();
        let bundle = bundle_for(
            "INTENT job { OBJECTIVE o TIME deadline: 1s AUTHORITY user: alice }",
            created,
        );
        assert!(matches!(
            spine.execute_at(&bundle, created + Duration::seconds(2)),
            Err(SpineError::TemporalExpired { .. })
        ));
    }

    #[test]
    fn tampered_contract_is_rejected() {
        let spine = ExecutionSpine::simulated(Arc::new(EventLog::new()));
        let mut bundle = bundle_for(SOURCE, Utc::now());
        bundle.temporal.deadline_seconds = 1.0e9;
        assert!(matches!(
            spine.execute(&bundle),
            Err(SpineError::ContractTampered { .. })
        ));
    }

    #[test]
    fn missing_adapter_is_reported() {
        let spine = ExecutionSpine::with_registry(
            Arc::new(EventLog::new()),
            SimRegistry::builder().with_cluster(ClusterType::Cpu).build(),
        );
        let bundle = bundle_for(SOURCE, Utc::now());
        assert_eq!(
            spine.execute(&bundle).unwrap_err(),
            SpineError::AdapterMissing("GB200".to_string())
        );
    }

    #[test]
    fn adapter_failure_is_logged_then_propagated() {
        let ledger = Arc::new(EventLog::new());
        let spine = ExecutionSpine::with_registry(
            Arc::clone(&ledger),
            SimRegistry::builder()
                .with_failing(ClusterType::Gb200, "node lost")
                .build(),
        );
        let bundle = bundle_for(SOURCE, Utc::now());
        let err = spine.execute(&bundle).unwrap_err();
        assert!(matches!(err, SpineError::Execution { .. }));

        let events = ledger.events_for(bundle.anchor_id());
        assert_eq!(
            events.iter().map(|e| e.event_type.clone()).collect::<Vec<_>>(),
            vec![EventType::ExecutionStarted, EventType::ExecutionFailed]
        );
        assert_eq!(events[1].payload["error_kind"], json!("execution"));
    }
}
