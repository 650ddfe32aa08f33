//! [`CapabilityResolver`] – maps abstract capability names to cluster types.
//!
//! Each capability has an ordered list of candidate cluster types.  Resolving
//! an intent picks, per capability, the first candidate its `HARDWARE`
//! statement permits; order is registration order and there is no scoring.
//! Unchosen candidates are kept as `alternatives` in the metadata.
//!
//! Resource requirements start from per-cluster defaults and are overridden
//! by constraints whose names end in `_VRAM`, `_MEMORY`, `_CORES` or
//! `_NODES`.
//!
//! # Example
//!
//! ```
//! use spine_lang::parse;
//! use spine_runtime::resolver::CapabilityResolver;
//! use spine_types::ClusterType;
//!
//! let resolver = CapabilityResolver::default();
//! let intent = parse("INTENT t { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }").unwrap();
//! let resolved = resolver.resolve(&intent).unwrap();
//! assert_eq!(resolved[0].name, "general_compute");
//! assert_eq!(resolved[0].cluster_type, ClusterType::Gb200);
//! ```

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use spine_lang::{ConstraintValue, Intent};
use spine_types::{ClusterType, SpineError};
use tracing::debug;

/// Capability substituted when an intent declares none.
pub const DEFAULT_CAPABILITY: &str = "general_compute";

/// Constraint-name suffixes that override a requirement key.
const REQUIREMENT_SUFFIXES: [(&str, &str); 4] = [
    ("_VRAM", "vram"),
    ("_MEMORY", "memory"),
    ("_CORES", "cores"),
    ("_NODES", "nodes"),
];

/// One capability bound to a concrete cluster type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCapability {
    pub name: String,
    pub cluster_type: ClusterType,
    pub requirements: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
}

/// Capability table shared across pipeline invocations.
pub struct CapabilityResolver {
    table: RwLock<BTreeMap<String, Vec<ClusterType>>>,
}

impl Default for CapabilityResolver {
    /// A resolver seeded with the built-in capability table.
    fn default() -> Self {
        use ClusterType::*;
        let builtin: [(&str, Vec<ClusterType>); 11] = [
            ("llm_training", vec![Gb200, Mi300x, Gaudi3, Cerebras]),
            ("llm_inference", vec![Gb200, Mi300x, Gaudi3, Cpu]),
            ("computer_vision", vec![Gb200, Mi300x, Ipu]),
            ("distributed_training", vec![Gb200, Mi300x, Cerebras]),
            ("quantum_simulation", vec![Qpu, Gb200, Cpu]),
            ("quantum_optimization", vec![Qpu]),
            ("graph_analytics", vec![Ipu, Cpu]),
            ("graph_neural_network", vec![Ipu, Gb200]),
            ("molecular_dynamics", vec![Gb200, Mi300x, Cpu]),
            ("climate_modeling", vec![Mi300x, Gb200, Cpu]),
            (DEFAULT_CAPABILITY, vec![Cpu, Gb200, Mi300x]),
        ];
        Self {
            table: RwLock::new(
                builtin
                    .into_iter()
                    .map(|(name, candidates)| (name.to_string(), candidates))
                    .collect(),
            ),
        }
    }
}

impl CapabilityResolver {
    /// A resolver with no capabilities registered.
    pub fn empty() -> Self {
        Self {
            table: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register `name` with `candidates`, replacing any previous entry.
    pub fn register_capability(&self, name: impl Into<String>, candidates: Vec<ClusterType>) {
        let name = name.into();
        debug!(capability = %name, candidates = candidates.len(), "capability registered");
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, candidates);
    }

    /// Append `cluster` to the candidates of `name` (creating the entry if
    /// needed).  Already-listed clusters keep their position.
    pub fn add_candidate(&self, name: &str, cluster: ClusterType) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let candidates = table.entry(name.to_string()).or_default();
        if !candidates.contains(&cluster) {
            candidates.push(cluster);
        }
    }

    pub fn candidates(&self, name: &str) -> Vec<ClusterType> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Registered capability names, sorted.
    pub fn capability_names(&self) -> Vec<String> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Resolve every capability `intent` declares, or
    /// [`DEFAULT_CAPABILITY`] when it declares none.
    ///
    /// # Errors
    ///
    /// [`SpineError::CapabilityResolution`] when a capability has no
    /// candidates or none survives the `HARDWARE` filter.
    pub fn resolve(&self, intent: &Intent) -> Result<Vec<ResolvedCapability>, SpineError> {
        if intent.capabilities().is_empty() {
            return Ok(vec![self.resolve_one(intent, DEFAULT_CAPABILITY)?]);
        }
        intent
            .capabilities()
            .iter()
            .map(|name| self.resolve_one(intent, name))
            .collect()
    }

    fn resolve_one(&self, intent: &Intent, name: &str) -> Result<ResolvedCapability, SpineError> {
        let candidates = self.candidates(name);
        if candidates.is_empty() {
            return Err(SpineError::CapabilityResolution {
                capability: name.to_string(),
                details: "no candidate cluster types registered".to_string(),
            });
        }

        let candidate_count = candidates.len();
        let mut permitted = candidates
            .into_iter()
            .filter(|c| intent.permits_cluster(c));
        let Some(chosen) = permitted.next() else {
            return Err(SpineError::CapabilityResolution {
                capability: name.to_string(),
                details: "every candidate is excluded by the hardware specification".to_string(),
            });
        };
        let alternatives: Vec<String> = permitted.map(|c| c.to_string()).collect();

        let metadata = BTreeMap::from([
            ("alternatives".to_string(), json!(alternatives)),
            ("candidate_count".to_string(), json!(candidate_count)),
            ("filtered".to_string(), json!(intent.hardware().is_some())),
        ]);
        let requirements = requirements_for(intent, &chosen);
        debug!(capability = name, cluster = %chosen, "capability resolved");

        Ok(ResolvedCapability {
            name: name.to_string(),
            cluster_type: chosen,
            requirements,
            metadata,
        })
    }
}

/// Baseline requirements for one allocation on `cluster`.
fn cluster_defaults(cluster: &ClusterType) -> BTreeMap<String, Value> {
    let (vram, memory, cores) = match cluster {
        ClusterType::Gb200 => (192, 480, 72),
        ClusterType::Mi300x => (192, 512, 96),
        ClusterType::Qpu => (0, 64, 16),
        ClusterType::Ipu => (0, 256, 1472),
        ClusterType::Gaudi3 => (128, 512, 64),
        ClusterType::Cpu => (0, 256, 64),
        ClusterType::Cerebras => (0, 1200, 900_000),
        ClusterType::Custom(_) => {
            return BTreeMap::from([("nodes".to_string(), json!(1))]);
        }
    };
    BTreeMap::from([
        ("vram".to_string(), json!(vram)),
        ("memory".to_string(), json!(memory)),
        ("cores".to_string(), json!(cores)),
        ("nodes".to_string(), json!(1)),
    ])
}

fn requirements_for(intent: &Intent, cluster: &ClusterType) -> BTreeMap<String, Value> {
    let mut requirements = cluster_defaults(cluster);
    for constraint in intent.constraints() {
        let upper = constraint.name.to_ascii_uppercase();
        let Some((_, key)) = REQUIREMENT_SUFFIXES
            .iter()
            .find(|(suffix, _)| upper.ends_with(suffix))
        else {
            continue;
        };
        let value = match &constraint.value {
            ConstraintValue::Number(n) => json!(n),
            ConstraintValue::Text(t) => json!(t),
        };
        requirements.insert((*key).to_string(), value);
    }
    requirements
}

#[cfg(test)]
mod tests {
    use super::*;
    use spine_lang::parse;

    fn intent(source: &str) -> Intent {
        parse(source).unwrap()
    }

    #[test]
    fn declared_capabilities_resolve_in_order() {
        let resolver = CapabilityResolver::default();
        let resolved = resolver
            .resolve(&intent(
                "INTENT t { OBJECTIVE o CAPABILITY quantum_optimization CAPABILITY llm_training }",
            ))
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].cluster_type, ClusterType::Qpu);
        assert_eq!(resolved[1].cluster_type, ClusterType::Gb200);
        assert_eq!(
            resolved[1].metadata["alternatives"],
            json!(["MI300X", "GAUDI3", "CEREBRAS"])
        );
        assert_eq!(resolved[1].metadata["candidate_count"], json!(4));
    }

    #[test]
    fn only_filter_selects_the_permitted_cluster() {
        let resolver = CapabilityResolver::default();
        let resolved = resolver
            .resolve(&intent(
                "INTENT t { OBJECTIVE o HARDWARE ONLY GB200 AUTHORITY user: alice }",
            ))
            .unwrap();
        assert_eq!(resolved[0].name, DEFAULT_CAPABILITY);
        assert_eq!(resolved[0].cluster_type, ClusterType::Gb200);
        assert_eq!(resolved[0].metadata["alternatives"], json!([]));
    }

    #[test]
    fn not_filter_skips_excluded_candidates() {
        let resolver = CapabilityResolver::default();
        let resolved = resolver
            .resolve(&intent(
                "INTENT t { OBJECTIVE o CAPABILITY llm_inference HARDWARE NOT GB200 AND MI300X }",
            ))
            .unwrap();
        assert_eq!(resolved[0].cluster_type, ClusterType::Gaudi3);
    }

    #[test]
    fn filter_emptying_candidates_is_fatal() {
        let resolver = CapabilityResolver::default();
        let err = resolver
            .resolve(&intent(
                "INTENT t { OBJECTIVE o CAPABILITY quantum_optimization HARDWARE ONLY CPU }",
            ))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SpineError::CapabilityResolution { ref capability, .. }
            if capability == "quantum_optimization"));
    }

    #[test]
    fn unknown_capability_is_fatal() {
        let resolver = CapabilityResolver::default();
        assert!(matches!(
            resolver.resolve(&intent("INTENT t { OBJECTIVE o CAPABILITY telepathy }")),
            Err(SpineError::CapabilityResolution { .. })
        ));
    }

    #[test]
    fn constraints_override_cluster_defaults() {
        let resolver = CapabilityResolver::default();
        let resolved = resolver
            .resolve(&intent(
                "INTENT t { OBJECTIVE o CAPABILITY llm_training \
                 CONSTRAINT GPU_VRAM >= 80 CONSTRAINT cluster_nodes >= 4 CONSTRAINT LATENCY < 5 }",
            ))
            .unwrap();
        let req = &resolved[0].requirements;
        assert_eq!(req["vram"], json!(80.0));
        assert_eq!(req["nodes"], json!(4.0));
        assert_eq!(req["memory"], json!(480));
        assert!(!req.contains_key("latency"));
    }

    #[test]
    fn runtime_registration_extends_the_table() {
        let resolver = CapabilityResolver::empty();
        let tpu = ClusterType::Custom("TPU_V5".to_string());
        resolver.register_capability("tensor_search", vec![tpu.clone()]);
        resolver.add_candidate("tensor_search", ClusterType::Cpu);
        resolver.add_candidate("tensor_search", tpu.clone());
        assert_eq!(resolver.candidates("tensor_search"), vec![tpu.clone(), ClusterType::Cpu]);

        let resolved = resolver
            .resolve(&intent("INTENT t { OBJECTIVE o CAPABILITY tensor_search }"))
            .unwrap();
        assert_eq!(resolved[0].cluster_type, tpu);
        assert_eq!(resolved[0].requirements, BTreeMap::from([("nodes".to_string(), json!(1))]));
        assert_eq!(resolver.capability_names(), vec!["tensor_search"]);
    }

    #[test]
    fn empty_resolver_cannot_supply_default() {
        let resolver = CapabilityResolver::empty();
        assert!(resolver.resolve(&intent("INTENT t { OBJECTIVE o }")).is_err());
    }
}
