//! [`ExecutionAdapter`] – the boundary between the execution spine and the
//! backend that actually runs a contract bundle.
//!
//! Backends implement this trait once per cluster type and are registered
//! with an [`AdapterRegistry`][crate::registry::AdapterRegistry].  The spine
//! calls [`ExecutionAdapter::validate_contract`] before
//! [`ExecutionAdapter::execute`] and never retries; a backend that wants
//! retries must do them inside `execute`.

use chrono::{DateTime, Utc};
use spine_types::{ClusterType, ContractBundle, ExecutionResult, SpineError};

/// An execution backend for one cluster type.
pub trait ExecutionAdapter: Send + Sync {
    /// The cluster type this adapter runs bundles for.
    fn cluster_type(&self) -> ClusterType;

    /// Reject bundles this adapter must not run.
    ///
    /// The default applies [`validate_bundle_for`] at the current time.
    ///
    /// # Errors
    ///
    /// See [`validate_bundle_for`].
    fn validate_contract(&self, bundle: &ContractBundle) -> Result<(), SpineError> {
        validate_bundle_for(bundle, &self.cluster_type(), Utc::now())
    }

    /// Run the bundle and report the outcome with an
    /// [`ExecutionProof`][spine_types::ExecutionProof].
    ///
    /// # Errors
    ///
    /// [`SpineError::Execution`] when the work could not complete.
    fn execute(&self, bundle: &ContractBundle) -> Result<ExecutionResult, SpineError>;
}

/// Checks every adapter must apply before running a bundle: the capability
/// contract is bound to `cluster`, every sub-contract references the
/// anchor, and the temporal contract has not expired at `now`.
///
/// # Errors
///
/// - [`SpineError::ClusterMismatch`]
/// - [`SpineError::ReferenceMismatch`]
/// - [`SpineError::TemporalExpired`]
pub fn validate_bundle_for(
    bundle: &ContractBundle,
    cluster: &ClusterType,
    now: DateTime<Utc>,
) -> Result<(), SpineError> {
    if bundle.cluster_type() != cluster {
        return Err(SpineError::ClusterMismatch {
            adapter: cluster.to_string(),
            bundle: bundle.cluster_type().to_string(),
        });
    }
    bundle.validate_references()?;
    bundle.check_not_expired(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::bundle;
    use chrono::Duration;

    #[test]
    fn matching_bundle_passes() {
        let b = bundle(ClusterType::Qpu, Utc::now(), 60.0);
        assert!(validate_bundle_for(&b, &ClusterType::Qpu, Utc::now()).is_ok());
    }

    #[test]
    fn cluster_mismatch_is_rejected_first() {
        let mut b = bundle(ClusterType::Qpu, Utc::now(), 60.0);
        b.event.intent_contract_id = "foreign".to_string();
        assert!(matches!(
            validate_bundle_for(&b, &ClusterType::Cpu, Utc::now()),
            Err(SpineError::ClusterMismatch { .. })
        ));
    }

    #[test]
    fn foreign_reference_is_rejected() {
        let mut b = bundle(ClusterType::Cpu, Utc::now(), 60.0);
        b.capability.intent_contract_id = "foreign".to_string();
        assert!(matches!(
            validate_bundle_for(&b, &ClusterType::Cpu, Utc::now()),
            Err(SpineError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn expired_bundle_is_rejected() {
        let created = Utc::now() - Duration::seconds(10);
        let b = bundle(ClusterType::Cpu, created, 1.0);
        assert!(matches!(
            validate_bundle_for(&b, &ClusterType::Cpu, Utc::now()),
            Err(SpineError::TemporalExpired { .. })
        ));
    }
}
