//! What an adapter hands back after running a contract bundle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::ClusterType;

/// Evidence that an adapter carried out a specific contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProof {
    pub proof_id: String,
    pub contract_id: String,
    pub cluster_type: ClusterType,
    pub timestamp: DateTime<Utc>,
    /// Content hash of the execution output.
    pub result_hash: String,
    /// `true` when re-running the same bundle yields the same `result_hash`.
    pub deterministic: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Outcome of dispatching a bundle through the execution spine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Id of the anchor intent contract.
    pub contract_id: String,
    pub cluster_type: ClusterType,
    pub execution_seconds: f64,
    pub proof: ExecutionProof,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionResult {
    /// The opaque proof token reported for this execution.
    pub fn proof_token(&self) -> &str {
        &self.proof.proof_id
    }
}
