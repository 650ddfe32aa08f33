//! [`ClusterType`] – the hardware classes a contract can be bound to.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};

/// A class of execution hardware.
///
/// The seven known tokens are closed variants; anything else registered at
/// runtime (custom resolver entries, custom topologies, custom adapters) is
/// carried as [`ClusterType::Custom`].  Serialized as its token string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClusterType {
    Gb200,
    Mi300x,
    Qpu,
    Ipu,
    Gaudi3,
    Cpu,
    Cerebras,
    /// A runtime-registered cluster type outside the built-in vocabulary.
    Custom(String),
}

impl ClusterType {
    /// Every built-in cluster type, in grammar order.
    pub const KNOWN: [ClusterType; 7] = [
        ClusterType::Gb200,
        ClusterType::Mi300x,
        ClusterType::Qpu,
        ClusterType::Ipu,
        ClusterType::Gaudi3,
        ClusterType::Cpu,
        ClusterType::Cerebras,
    ];

    /// Look up a built-in token.  Returns `None` for anything else, including
    /// lowercase spellings.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GB200" => Some(Self::Gb200),
            "MI300X" => Some(Self::Mi300x),
            "QPU" => Some(Self::Qpu),
            "IPU" => Some(Self::Ipu),
            "GAUDI3" => Some(Self::Gaudi3),
            "CPU" => Some(Self::Cpu),
            "CEREBRAS" => Some(Self::Cerebras),
            _ => None,
        }
    }

    /// The token as written in intent source.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gb200 => "GB200",
            Self::Mi300x => "MI300X",
            Self::Qpu => "QPU",
            Self::Ipu => "IPU",
            Self::Gaudi3 => "GAUDI3",
            Self::Cpu => "CPU",
            Self::Cerebras => "CEREBRAS",
            Self::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ClusterType {
    fn from(token: String) -> Self {
        Self::from_token(&token).unwrap_or(Self::Custom(token))
    }
}

impl From<&str> for ClusterType {
    fn from(token: &str) -> Self {
        Self::from(token.to_string())
    }
}

impl From<ClusterType> for String {
    fn from(cluster: ClusterType) -> Self {
        match cluster {
            ClusterType::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for ClusterType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl JsonSchema for ClusterType {
    fn schema_name() -> String {
        "ClusterType".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        <String as JsonSchema>::json_schema(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_roundtrip_through_strings() {
        for cluster in ClusterType::KNOWN {
            let token: String = cluster.clone().into();
            assert_eq!(ClusterType::from(token), cluster);
        }
    }

    #[test]
    fn unknown_token_becomes_custom() {
        assert_eq!(
            ClusterType::from("TPU_V5"),
            ClusterType::Custom("TPU_V5".to_string())
        );
        assert!(ClusterType::from_token("TPU_V5").is_none());
    }

    #[test]
    fn lowercase_is_not_a_known_token() {
        assert!(ClusterType::from_token("gb200").is_none());
    }

    #[test]
    fn serializes_as_plain_token() {
        let json = serde_json::to_string(&ClusterType::Mi300x).unwrap();
        assert_eq!(json, "\"MI300X\"");
        let back: ClusterType = serde_json::from_str("\"QPU\"").unwrap();
        assert_eq!(back, ClusterType::Qpu);
    }
}
