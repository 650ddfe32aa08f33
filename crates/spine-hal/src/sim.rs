//! In-process simulated adapters for tests and CI without any real backend.
//!
//! [`SimulatedAdapter`] accepts any valid bundle for its cluster type and
//! returns a deterministic [`ExecutionProof`]: the result hash covers the
//! four contract ids, so running the same bundle twice yields the same
//! proof id.  A failing variant reports [`SpineError::Execution`] instead.
//!
//! [`SimRegistry`] builds an [`AdapterRegistry`] populated with them.
//!
//! # Example
//!
//! ```rust
//! use spine_hal::sim::SimRegistry;
//! use spine_types::ClusterType;
//!
//! let registry = SimRegistry::builder()
//!     .with_cluster(ClusterType::Gb200)
//!     .with_failing(ClusterType::Qpu, "decoherence")
//!     .build();
//!
//! assert_eq!(registry.len(), 2);
//! assert!(registry.contains(&ClusterType::Qpu));
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use spine_types::hashing::hash_canonical;
use spine_types::{ClusterType, ContractBundle, ExecutionProof, ExecutionResult, SpineError};
use tracing::debug;

use crate::adapter::ExecutionAdapter;
use crate::registry::AdapterRegistry;

// ────────────────────────────────────────────────────────────────────────────
// SimulatedAdapter
// ────────────────────────────────────────────────────────────────────────────

/// A simulated backend for one cluster type.  Counts every `execute` call.
pub struct SimulatedAdapter {
    cluster_type: ClusterType,
    failure: Option<String>,
    executions: AtomicUsize,
}

impl SimulatedAdapter {
    /// An adapter that always succeeds.
    pub fn new(cluster_type: ClusterType) -> Self {
        Self {
            cluster_type,
            failure: None,
            executions: AtomicUsize::new(0),
        }
    }

    /// An adapter whose every execution fails with `details`.
    pub fn failing(cluster_type: ClusterType, details: impl Into<String>) -> Self {
        Self {
            failure: Some(details.into()),
            ..Self::new(cluster_type)
        }
    }

    /// How many times `execute` has been called.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl ExecutionAdapter for SimulatedAdapter {
    fn cluster_type(&self) -> ClusterType {
        self.cluster_type.clone()
    }

    fn execute(&self, bundle: &ContractBundle) -> Result<ExecutionResult, SpineError> {
        let started = Instant::now();
        let run = self.executions.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(details) = &self.failure {
            return Err(SpineError::Execution {
                cluster: self.cluster_type.to_string(),
                details: details.clone(),
            });
        }

        let anchor = bundle.anchor_id();
        let result_hash = hash_canonical(&[
            anchor,
            bundle.capability.contract_id.as_str(),
            bundle.temporal.contract_id.as_str(),
            bundle.event.contract_id.as_str(),
        ])?;
        let proof_id = hash_canonical(&json!({
            "contract_id": anchor,
            "cluster_type": self.cluster_type.as_str(),
            "result_hash": result_hash,
        }))?;

        let topology = &bundle.capability.topology;
        let proof = ExecutionProof {
            proof_id,
            contract_id: anchor.to_string(),
            cluster_type: self.cluster_type.clone(),
            timestamp: Utc::now(),
            result_hash,
            deterministic: true,
            metadata: BTreeMap::from([
                ("adapter".to_string(), json!("simulated")),
                ("nodes".to_string(), json!(topology.node_count)),
                (
                    "accelerators".to_string(),
                    json!(topology.total_accelerators()),
                ),
            ]),
        };
        debug!(cluster = %self.cluster_type, contract_id = anchor, run, "simulated execution");

        Ok(ExecutionResult {
            success: true,
            contract_id: anchor.to_string(),
            cluster_type: self.cluster_type.clone(),
            execution_seconds: started.elapsed().as_secs_f64(),
            proof,
            metadata: BTreeMap::from([("run".to_string(), json!(run))]),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRegistry builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs an [`AdapterRegistry`] populated with
/// [`SimulatedAdapter`]s.
#[derive(Default)]
pub struct SimRegistry {
    adapters: Vec<SimulatedAdapter>,
}

impl SimRegistry {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Add a succeeding adapter for `cluster`.
    pub fn with_cluster(mut self, cluster: ClusterType) -> Self {
        self.adapters.push(SimulatedAdapter::new(cluster));
        self
    }

    /// Add a succeeding adapter for every built-in cluster type.
    pub fn with_all_known(mut self) -> Self {
        for cluster in ClusterType::KNOWN {
            self.adapters.push(SimulatedAdapter::new(cluster));
        }
        self
    }

    /// Add an adapter for `cluster` that always fails with `details`.
    pub fn with_failing(mut self, cluster: ClusterType, details: impl Into<String>) -> Self {
        self.adapters.push(SimulatedAdapter::failing(cluster, details));
        self
    }

    /// Later entries for the same cluster type replace earlier ones.
    pub fn build(self) -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        for adapter in self.adapters {
            registry.register(Box::new(adapter));
        }
        registry
    }
}
