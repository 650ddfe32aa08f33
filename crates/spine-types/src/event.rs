//! Audit events and their hash-chain identity.
//!
//! An [`Event`] identifies itself by the SHA-256 of its canonical JSON with
//! the `event_id` field removed.  Events for the same contract id link to
//! their predecessor through `previous_event_hash`, forming a chain that
//! `spine-ledger` verifies.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SpineError;
use crate::hashing::content_id;

/// Free-form event payload / metadata map.  Sorted so canonical hashing is
/// stable without extra work.
pub type EventData = BTreeMap<String, Value>;

/// The lifecycle step an [`Event`] records.
///
/// The variants cover every step the pipeline itself emits; adapters may
/// log their own steps as [`EventType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    IntentReceived,
    IntentAuthorized,
    AuthorizationFailed,
    /// Capability resolution or contract issuance stopped the submission.
    IssuanceFailed,
    ContractsIssued,
    CapabilityBound,
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    AuditLogged,
    ParseFailed,
    Custom(String),
}

impl EventType {
    /// The event sequence every issued contract bundle expects, in order.
    pub const DEFAULT_SEQUENCE: [EventType; 7] = [
        EventType::IntentReceived,
        EventType::IntentAuthorized,
        EventType::ContractsIssued,
        EventType::CapabilityBound,
        EventType::ExecutionStarted,
        EventType::ExecutionCompleted,
        EventType::AuditLogged,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::IntentReceived => "IntentReceived",
            Self::IntentAuthorized => "IntentAuthorized",
            Self::AuthorizationFailed => "AuthorizationFailed",
            Self::IssuanceFailed => "IssuanceFailed",
            Self::ContractsIssued => "ContractsIssued",
            Self::CapabilityBound => "CapabilityBound",
            Self::ExecutionStarted => "ExecutionStarted",
            Self::ExecutionCompleted => "ExecutionCompleted",
            Self::ExecutionFailed => "ExecutionFailed",
            Self::AuditLogged => "AuditLogged",
            Self::ParseFailed => "ParseFailed",
            Self::Custom(name) => name,
        }
    }

    /// `true` for the event types that explain why a submission stopped.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationFailed
                | Self::IssuanceFailed
                | Self::ExecutionFailed
                | Self::ParseFailed
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "IntentReceived" => Self::IntentReceived,
            "IntentAuthorized" => Self::IntentAuthorized,
            "AuthorizationFailed" => Self::AuthorizationFailed,
            "IssuanceFailed" => Self::IssuanceFailed,
            "ContractsIssued" => Self::ContractsIssued,
            "CapabilityBound" => Self::CapabilityBound,
            "ExecutionStarted" => Self::ExecutionStarted,
            "ExecutionCompleted" => Self::ExecutionCompleted,
            "ExecutionFailed" => Self::ExecutionFailed,
            "AuditLogged" => Self::AuditLogged,
            "ParseFailed" => Self::ParseFailed,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// One immutable audit record.
///
/// The serialized field set is the ledger export format:
/// `event_id, event_type, timestamp, contract_id, previous_event_hash,
/// payload, metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub contract_id: String,
    /// Id of the previous event for the same `contract_id`; empty for the
    /// first event of a chain.
    pub previous_event_hash: String,
    pub payload: EventData,
    pub metadata: EventData,
}

impl Event {
    /// Build an event and derive its `event_id` from every other field.
    ///
    /// # Errors
    ///
    /// [`SpineError::Serialization`] when the payload cannot be canonicalized.
    pub fn seal(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        contract_id: impl Into<String>,
        previous_event_hash: impl Into<String>,
        payload: EventData,
        metadata: EventData,
    ) -> Result<Self, SpineError> {
        let mut event = Self {
            event_id: String::new(),
            event_type,
            timestamp,
            contract_id: contract_id.into(),
            previous_event_hash: previous_event_hash.into(),
            payload,
            metadata,
        };
        event.event_id = event.compute_id()?;
        Ok(event)
    }

    /// Recompute the content hash this event should carry.
    ///
    /// # Errors
    ///
    /// [`SpineError::Serialization`] when the payload cannot be canonicalized.
    pub fn compute_id(&self) -> Result<String, SpineError> {
        content_id(self, "event_id")
    }

    /// `true` when the stored id matches the recomputed content hash.
    pub fn is_intact(&self) -> bool {
        self.compute_id().is_ok_and(|id| id == self.event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(payload: EventData) -> Event {
        Event::seal(
            EventType::ExecutionStarted,
            Utc::now(),
            "contract-1",
            "",
            payload,
            EventData::new(),
        )
        .unwrap()
    }

    #[test]
    fn sealed_event_is_intact() {
        let event = sample(EventData::from([("k".to_string(), json!(1))]));
        assert_eq!(event.event_id.len(), 64);
        assert!(event.is_intact());
    }

    #[test]
    fn edited_payload_breaks_identity() {
        let mut event = sample(EventData::from([("k".to_string(), json!(1))]));
        event.payload.insert("k".to_string(), json!(2));
        assert!(!event.is_intact());
    }

    #[test]
    fn event_type_names_roundtrip() {
        for event_type in EventType::DEFAULT_SEQUENCE {
            let name: String = event_type.clone().into();
            assert_eq!(EventType::from(name), event_type);
        }
        assert_eq!(
            EventType::from("AdapterWarmup"),
            EventType::Custom("AdapterWarmup".to_string())
        );
    }

    #[test]
    fn export_field_names_are_stable() {
        let event = sample(EventData::new());
        let value = serde_json::to_value(&event).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for field in [
            "event_id",
            "event_type",
            "timestamp",
            "contract_id",
            "previous_event_hash",
            "payload",
            "metadata",
        ] {
            assert!(keys.contains(&field), "missing {field}");
        }
    }
}
