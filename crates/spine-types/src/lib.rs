//! `spine-types` – shared vocabulary of the intent-to-execution pipeline.
//!
//! # Modules
//!
//! - [`cluster`] – [`ClusterType`]: the hardware classes a contract binds to.
//! - [`contract`] – the four content-addressed contracts and
//!   [`ContractBundle`].
//! - [`event`] – [`Event`] and [`EventType`]: hash-chained audit records.
//! - [`execution`] – [`ExecutionResult`] / [`ExecutionProof`] returned by
//!   adapters.
//! - [`hashing`] – RFC 8785 canonical JSON and SHA-256 content ids.

pub mod cluster;
pub mod contract;
pub mod event;
pub mod execution;
pub mod hashing;

pub use cluster::ClusterType;
pub use contract::{
    CapabilityContract, CausalTransition, ClusterTopology, ContractBundle, ContractType,
    EventContract, ExecutionWindow, IntentContract, TemporalContract,
};
pub use event::{Event, EventData, EventType};
pub use execution::{ExecutionProof, ExecutionResult};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global error type spanning every pipeline stage.
///
/// Use [`SpineError::is_fatal`] to tell errors that end a submission for
/// good from those the caller is expected to correct and resubmit.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpineError {
    #[error("Parse failure at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Authorization denied for intent '{intent}': {reason}")]
    AuthorizationDenied {
        intent: String,
        reason: String,
        violations: Vec<String>,
    },

    #[error("Capability '{capability}' cannot be resolved: {details}")]
    CapabilityResolution { capability: String, details: String },

    #[error("Contracts not issued: authorization for '{0}' is not granted")]
    UnauthorizedIssuance(String),

    #[error("Contract issuance failed: {0}")]
    Issuance(String),

    #[error("{contract_type} contract references {found}, expected anchor {expected}")]
    ReferenceMismatch {
        contract_type: String,
        expected: String,
        found: String,
    },

    #[error("{contract_type} contract {contract_id} does not match its content hash")]
    ContractTampered {
        contract_type: String,
        contract_id: String,
    },

    #[error("Temporal contract {contract_id} expired at {deadline}")]
    TemporalExpired { contract_id: String, deadline: String },

    #[error("Adapter for {adapter} cannot run a bundle bound to {bundle}")]
    ClusterMismatch { adapter: String, bundle: String },

    #[error("No adapter registered for cluster type {0}")]
    AdapterMissing(String),

    #[error("Execution failed on {cluster}: {details}")]
    Execution { cluster: String, details: String },

    #[error("Event chain for {contract_id} broken at position {position}: {details}")]
    ChainBroken {
        contract_id: String,
        position: usize,
        details: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Ledger archive error: {0}")]
    Archive(String),
}

impl SpineError {
    /// `false` only for errors the caller can correct before resubmitting
    /// the same request: malformed source and issuing without a grant.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse { .. } | Self::UnauthorizedIssuance(_))
    }

    /// Short machine-readable kind, used as the `error_kind` field of
    /// failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::AuthorizationDenied { .. } => "authorization",
            Self::CapabilityResolution { .. } => "capability_resolution",
            Self::UnauthorizedIssuance(_) | Self::Issuance(_) => "issuance",
            Self::ReferenceMismatch { .. }
            | Self::ContractTampered { .. }
            | Self::TemporalExpired { .. }
            | Self::ClusterMismatch { .. } => "bundle_validation",
            Self::AdapterMissing(_) | Self::Execution { .. } => "execution",
            Self::ChainBroken { .. } => "ledger",
            Self::Serialization(_) => "serialization",
            Self::Archive(_) => "archive",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_are_not_fatal() {
        let err = SpineError::Parse {
            line: 3,
            column: 7,
            message: "expected '}'".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("3:7"));
    }

    #[test]
    fn authorization_denial_is_fatal() {
        let err = SpineError::AuthorizationDenied {
            intent: "t".to_string(),
            reason: "untrusted".to_string(),
            violations: vec!["trust level is untrusted".to_string()],
        };
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "authorization");
    }

    #[test]
    fn unauthorized_issuance_is_caller_responsibility() {
        assert!(!SpineError::UnauthorizedIssuance("t".to_string()).is_fatal());
        assert!(SpineError::Issuance("no capabilities".to_string()).is_fatal());
    }

    #[test]
    fn error_serialization_roundtrip() {
        let err = SpineError::ReferenceMismatch {
            contract_type: "event".to_string(),
            expected: "a".to_string(),
            found: "b".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: SpineError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
