//! [`AdapterRegistry`] – execution adapters keyed by [`ClusterType`].
//!
//! The execution spine resolves the adapter for a bundle from the cluster
//! type bound in its capability contract.  Custom cluster types register
//! like built-in ones.

use std::collections::HashMap;

use spine_types::ClusterType;
use tracing::debug;

use crate::adapter::ExecutionAdapter;

/// Central adapter registry.
///
/// Construct with [`AdapterRegistry::new`] (or
/// [`SimRegistry`][crate::sim::SimRegistry]), register adapters, then hand
/// it to the execution spine.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ClusterType, Box<dyn ExecutionAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own cluster type.  Any adapter
    /// previously registered for that type is replaced.
    pub fn register(&mut self, adapter: Box<dyn ExecutionAdapter>) {
        let cluster = adapter.cluster_type();
        debug!(cluster = %cluster, "adapter registered");
        self.adapters.insert(cluster, adapter);
    }

    pub fn get(&self, cluster: &ClusterType) -> Option<&dyn ExecutionAdapter> {
        self.adapters.get(cluster).map(|a| a.as_ref())
    }

    pub fn contains(&self, cluster: &ClusterType) -> bool {
        self.adapters.contains_key(cluster)
    }

    /// Registered cluster types, sorted.
    pub fn cluster_types(&self) -> Vec<ClusterType> {
        let mut types: Vec<ClusterType> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
