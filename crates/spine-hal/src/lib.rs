//! `spine-hal` – the execution adapter boundary.
//!
//! # Modules
//!
//! - [`adapter`] – [`ExecutionAdapter`][adapter::ExecutionAdapter]: the
//!   trait a backend implements per cluster type, plus the shared
//!   [`validate_bundle_for`][adapter::validate_bundle_for] checks.
//! - [`registry`] – [`AdapterRegistry`][registry::AdapterRegistry]: adapters
//!   keyed by [`ClusterType`][spine_types::ClusterType].
//! - [`sim`] – [`SimulatedAdapter`][sim::SimulatedAdapter] and the
//!   [`SimRegistry`][sim::SimRegistry] builder for backend-free runs.

pub mod adapter;
pub mod registry;
pub mod sim;

pub use adapter::{ExecutionAdapter, validate_bundle_for};
pub use registry::AdapterRegistry;
pub use sim::{SimRegistry, SimulatedAdapter};

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use spine_types::{
        CapabilityContract, ClusterTopology, ClusterType, ContractBundle, EventContract,
        EventType, IntentContract, TemporalContract,
    };

    pub fn bundle(cluster: ClusterType, created_at: DateTime<Utc>, deadline: f64) -> ContractBundle {
        let intent = IntentContract::issue(
            "job",
            "run",
            vec!["general_compute".to_string()],
            "hash",
            "authz-proof",
            created_at,
        )
        .unwrap();
        let anchor = intent.contract_id.clone();
        ContractBundle {
            capability: CapabilityContract::issue(
                &anchor,
                ClusterTopology::generic(cluster),
                BTreeMap::new(),
                "cap-proof",
                created_at,
            )
            .unwrap(),
            temporal: TemporalContract::issue(&anchor, deadline, None, None, true, "t-proof", created_at)
                .unwrap(),
            event: EventContract::issue(
                &anchor,
                EventType::DEFAULT_SEQUENCE.to_vec(),
                "e-proof",
                created_at,
            )
            .unwrap(),
            intent,
        }
    }
}
