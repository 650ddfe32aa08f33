//! [`Pipeline`] – intent source in, execution result out.
//!
//! Each [`Pipeline::submit`] runs the stages in order and stops at the
//! first failure:
//!
//! 1. **Parse** – failures are logged as `ParseFailed` under [`INTAKE_KEY`].
//! 2. **Authorize** – `IntentReceived` then `IntentAuthorized` or
//!    `AuthorizationFailed`, under the intake key `intent:<name>`.
//! 3. **Resolve + issue** – failures are logged as `IssuanceFailed` on the
//!    intake key.  On success the anchor chain opens with `ContractsIssued`,
//!    whose payload links the intake chain head, then `CapabilityBound`.
//! 4. **Execute** – through the [`ExecutionSpine`].
//!
//! After execution the anchor chain is checked against the bundle's event
//! contract; deviations are logged as warnings and returned with the
//! [`Submission`].
//!
//! All services are explicitly constructed and shared via `Arc`, so several
//! pipelines (or threads) can use one ledger and one authorization cache.
//!
//! # Example
//!
//! ```
//! use spine_runtime::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(&PipelineConfig::default());
//! let submission = pipeline
//!     .submit("INTENT t { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }")
//!     .unwrap();
//! assert!(submission.result.success);
//! assert!(pipeline.ledger().verify_all().is_ok());
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use spine_hal::SimRegistry;
use spine_kernel::{
    AuthorizationEngine, AuthorizationResult, MaxDeadline, PolicyEngine, RequireAuthority,
    Severity,
};
use spine_lang::{AuthorityKey, Intent, intent_hash, parse};
use spine_ledger::EventLog;
use spine_types::{ClusterType, ContractBundle, EventData, EventType, ExecutionResult, SpineError};
use tracing::{info, warn};

use crate::execution::ExecutionSpine;
use crate::issuer::ContractIssuer;
use crate::resolver::{CapabilityResolver, ResolvedCapability};

/// Ledger key for submissions that never produced an intent name.
pub const INTAKE_KEY: &str = "intake";

/// Ledger key for events about intent `name` before contracts exist.
pub fn intake_key(name: &str) -> String {
    format!("intent:{name}")
}

/// Which adapters the execution spine dispatches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    /// A simulated adapter for whatever cluster the bundle names.
    #[default]
    Simulated,
    /// Only adapters registered for [`PipelineConfig::clusters`].
    Registry,
}

/// Library-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub adapter_mode: AdapterMode,
    /// Clusters given a simulated adapter in [`AdapterMode::Registry`].
    pub clusters: Vec<ClusterType>,
    /// Deadline cap enforced as an error-severity policy rule.
    pub max_deadline_seconds: Option<f64>,
    /// Require an `AUTHORITY user:` statement on top of the built-in checks.
    pub require_user_authority: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            adapter_mode: AdapterMode::Simulated,
            clusters: ClusterType::KNOWN.to_vec(),
            max_deadline_seconds: None,
            require_user_authority: false,
        }
    }
}

impl PipelineConfig {
    /// The policy rules these settings ask for.
    pub fn policy(&self) -> PolicyEngine {
        let mut policy = PolicyEngine::new();
        if let Some(max_seconds) = self.max_deadline_seconds {
            policy.add_rule(Box::new(MaxDeadline {
                max_seconds,
                severity: Severity::Error,
            }));
        }
        if self.require_user_authority {
            policy.add_rule(Box::new(RequireAuthority {
                key: AuthorityKey::User,
                severity: Severity::Error,
            }));
        }
        policy
    }
}

/// Everything a successful submission produced.
#[derive(Debug, Clone)]
pub struct Submission {
    pub intent: Intent,
    pub authorization: AuthorizationResult,
    pub capabilities: Vec<ResolvedCapability>,
    pub bundle: ContractBundle,
    pub result: ExecutionResult,
    /// Deviations of the anchor chain from the event contract.
    pub sequence_warnings: Vec<String>,
}

/// The end-to-end pipeline.  See the [module docs](self).
pub struct Pipeline {
    ledger: Arc<EventLog>,
    authorization: Arc<AuthorizationEngine>,
    resolver: Arc<CapabilityResolver>,
    issuer: Arc<ContractIssuer>,
    spine: ExecutionSpine,
}

impl Pipeline {
    /// Build every service from `config` with a fresh ledger.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_ledger(config, Arc::new(EventLog::new()))
    }

    /// Build every service from `config` around an existing ledger, for
    /// example one restored from a [`spine_ledger::LedgerArchive`].
    pub fn with_ledger(config: &PipelineConfig, ledger: Arc<EventLog>) -> Self {
        let spine = match config.adapter_mode {
            AdapterMode::Simulated => ExecutionSpine::simulated(Arc::clone(&ledger)),
            AdapterMode::Registry => {
                let registry = config
                    .clusters
                    .iter()
                    .cloned()
                    .fold(SimRegistry::builder(), SimRegistry::with_cluster)
                    .build();
                ExecutionSpine::with_registry(Arc::clone(&ledger), registry)
            }
        };
        Self::from_parts(
            Arc::new(AuthorizationEngine::new(config.policy())),
            Arc::new(CapabilityResolver::default()),
            Arc::new(ContractIssuer::default()),
            spine,
        )
    }

    /// Assemble a pipeline from existing services; the ledger is the one
    /// `spine` writes to.
    pub fn from_parts(
        authorization: Arc<AuthorizationEngine>,
        resolver: Arc<CapabilityResolver>,
        issuer: Arc<ContractIssuer>,
        spine: ExecutionSpine,
    ) -> Self {
        Self {
            ledger: Arc::clone(spine.ledger()),
            authorization,
            resolver,
            issuer,
            spine,
        }
    }

    pub fn ledger(&self) -> &Arc<EventLog> {
        &self.ledger
    }

    pub fn authorization(&self) -> &Arc<AuthorizationEngine> {
        &self.authorization
    }

    pub fn resolver(&self) -> &Arc<CapabilityResolver> {
        &self.resolver
    }

    pub fn issuer(&self) -> &Arc<ContractIssuer> {
        &self.issuer
    }

    pub fn spine(&self) -> &ExecutionSpine {
        &self.spine
    }

    /// Parse `source` and run it through every stage.
    ///
    /// # Errors
    ///
    /// The first stage failure, after its failure event has been appended.
    pub fn submit(&self, source: &str) -> Result<Submission, SpineError> {
        let intent = match parse(source) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(line = e.line, column = e.column, error = %e.message, "intent rejected by parser");
                self.record(
                    EventType::ParseFailed,
                    INTAKE_KEY,
                    EventData::from([
                        ("line".to_string(), json!(e.line)),
                        ("column".to_string(), json!(e.column)),
                        ("message".to_string(), json!(e.message)),
                    ]),
                );
                return Err(e.into());
            }
        };
        self.submit_intent(intent)
    }

    /// Run an already-parsed intent through authorization, issuance and
    /// execution.
    ///
    /// # Errors
    ///
    /// The first stage failure, after its failure event has been appended.
    pub fn submit_intent(&self, intent: Intent) -> Result<Submission, SpineError> {
        let intake = intake_key(intent.name());
        let hash = intent_hash(&intent)?;
        self.ledger.log_event(
            EventType::IntentReceived,
            &intake,
            EventData::from([
                ("intent_name".to_string(), json!(intent.name())),
                ("objective".to_string(), json!(intent.objective())),
                ("intent_hash".to_string(), json!(hash)),
            ]),
        )?;

        let authorization = match self.authorization.authorize(&intent) {
            Ok(result) => result,
            Err(e) => {
                let mut payload = EventData::from([("error".to_string(), json!(e.to_string()))]);
                if let SpineError::AuthorizationDenied {
                    reason, violations, ..
                } = &e
                {
                    payload.insert("reason".to_string(), json!(reason));
                    payload.insert("violations".to_string(), json!(violations));
                }
                self.record(EventType::AuthorizationFailed, &intake, payload);
                return Err(e);
            }
        };
        self.ledger.log_event(
            EventType::IntentAuthorized,
            &intake,
            EventData::from([
                ("intent_hash".to_string(), json!(authorization.intent_hash)),
                ("warnings".to_string(), json!(authorization.warnings)),
            ]),
        )?;

        let (capabilities, bundle) = self
            .resolver
            .resolve(&intent)
            .and_then(|capabilities| {
                let bundle = self.issuer.issue(&intent, &authorization, &capabilities)?;
                Ok((capabilities, bundle))
            })
            .inspect_err(|e| {
                self.record(
                    EventType::IssuanceFailed,
                    &intake,
                    EventData::from([
                        ("error_kind".to_string(), json!(e.kind())),
                        ("error".to_string(), json!(e.to_string())),
                    ]),
                );
            })?;

        let anchor = bundle.anchor_id();
        self.ledger.log_event(
            EventType::ContractsIssued,
            anchor,
            EventData::from([
                ("intent_name".to_string(), json!(intent.name())),
                ("intake_head".to_string(), json!(self.ledger.head_id(&intake))),
                ("capability_contract".to_string(), json!(bundle.capability.contract_id)),
                ("temporal_contract".to_string(), json!(bundle.temporal.contract_id)),
                ("event_contract".to_string(), json!(bundle.event.contract_id)),
            ]),
        )?;
        self.ledger.log_event(
            EventType::CapabilityBound,
            anchor,
            EventData::from([
                ("cluster_type".to_string(), json!(bundle.cluster_type())),
                (
                    "capabilities".to_string(),
                    json!(capabilities.iter().map(|c| &c.name).collect::<Vec<_>>()),
                ),
                ("node_count".to_string(), json!(bundle.capability.topology.node_count)),
            ]),
        )?;

        let result = self.spine.execute(&bundle)?;

        let sequence_warnings = bundle
            .event
            .sequence_violations(&self.ledger.event_types_for(anchor));
        for violation in &sequence_warnings {
            warn!(contract_id = anchor, %violation, "event sequence deviates from contract");
        }
        info!(
            intent = intent.name(),
            contract_id = anchor,
            cluster = %result.cluster_type,
            proof = result.proof_token(),
            "submission complete"
        );

        Ok(Submission {
            intent,
            authorization,
            capabilities,
            bundle,
            result,
            sequence_warnings,
        })
    }

    /// Append a failure event; a ledger error is logged, never raised, so
    /// the original failure is what the caller sees.
    fn record(&self, event_type: EventType, key: &str, payload: EventData) {
        if let Err(e) = self.ledger.log_event(event_type, key, payload) {
            warn!(key, error = %e, "failure event not recorded");
        }
    }
}
