//! [`EventLog`] – append-only, per-contract hash-chained audit log.
//!
//! Events are indexed twice: globally in append order and per contract id.
//! Appending computes the previous-hash link from the last event for the
//! same contract id and seals the event's content id, all under one write
//! lock, so chains for a contract are totally ordered and never interleave.
//!
//! The log is an explicitly constructed service.  Share one instance across
//! pipeline stages with an `Arc<EventLog>`.
//!
//! # Example
//!
//! ```
//! use spine_ledger::EventLog;
//! use spine_types::{EventData, EventType};
//!
//! let log = EventLog::new();
//! log.log_event(EventType::ContractsIssued, "c-1", EventData::new()).unwrap();
//! log.log_event(EventType::CapabilityBound, "c-1", EventData::new()).unwrap();
//!
//! assert_eq!(
//!     log.event_types_for("c-1"),
//!     vec![EventType::ContractsIssued, EventType::CapabilityBound]
//! );
//! assert!(log.verify_chain("c-1").is_ok());
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use spine_types::{Event, EventData, EventType, SpineError};
use tracing::debug;

#[derive(Default)]
struct LogState {
    events: Vec<Event>,
    /// contract id → positions in `events`, in append order.
    by_contract: HashMap<String, Vec<usize>>,
    /// Contract ids in order of their first event.
    contracts: Vec<String>,
}

impl LogState {
    fn push(&mut self, event: Event) {
        let position = self.events.len();
        match self.by_contract.get_mut(&event.contract_id) {
            Some(positions) => positions.push(position),
            None => {
                self.contracts.push(event.contract_id.clone());
                self.by_contract
                    .insert(event.contract_id.clone(), vec![position]);
            }
        }
        self.events.push(event);
    }

    fn chain(&self, contract_id: &str) -> Vec<&Event> {
        self.by_contract
            .get(contract_id)
            .map(|positions| positions.iter().map(|&p| &self.events[p]).collect())
            .unwrap_or_default()
    }

    fn head(&self, contract_id: &str) -> Option<&Event> {
        self.by_contract
            .get(contract_id)
            .and_then(|positions| positions.last())
            .map(|&p| &self.events[p])
    }
}

/// Append-only event store.  See the [module docs](self).
#[derive(Default)]
pub struct EventLog {
    state: RwLock<LogState>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously exported events.
    ///
    /// # Errors
    ///
    /// [`SpineError::ChainBroken`] if the events do not form valid chains.
    pub fn restore(events: Vec<Event>) -> Result<Self, SpineError> {
        verify_events(&events)?;
        let mut state = LogState::default();
        for event in events {
            state.push(event);
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new event to the chain of `contract_id`.
    ///
    /// # Errors
    ///
    /// [`SpineError::Serialization`] when the payload cannot be
    /// canonicalized; nothing is appended in that case.
    pub fn append(
        &self,
        event_type: EventType,
        contract_id: &str,
        payload: EventData,
        metadata: EventData,
    ) -> Result<Event, SpineError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = state
            .head(contract_id)
            .map(|e| e.event_id.clone())
            .unwrap_or_default();
        let event = Event::seal(
            event_type,
            Utc::now(),
            contract_id,
            previous,
            payload,
            metadata,
        )?;
        debug!(
            event_type = %event.event_type,
            contract_id,
            event_id = %event.event_id,
            "event appended"
        );
        state.push(event.clone());
        Ok(event)
    }

    /// Entry point for adapters: append with empty metadata.
    ///
    /// # Errors
    ///
    /// See [`EventLog::append`].
    pub fn log_event(
        &self,
        event_type: EventType,
        contract_id: &str,
        payload: EventData,
    ) -> Result<Event, SpineError> {
        self.append(event_type, contract_id, payload, EventData::new())
    }

    pub fn events_for(&self, contract_id: &str) -> Vec<Event> {
        self.read().chain(contract_id).into_iter().cloned().collect()
    }

    pub fn event_types_for(&self, contract_id: &str) -> Vec<EventType> {
        self.read()
            .chain(contract_id)
            .into_iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Id of the last event for `contract_id`, if any.
    pub fn head_id(&self, contract_id: &str) -> Option<String> {
        self.read().head(contract_id).map(|e| e.event_id.clone())
    }

    /// Number of events of `event_type` across all contracts.
    pub fn count_by_type(&self, event_type: &EventType) -> usize {
        self.read()
            .events
            .iter()
            .filter(|e| &e.event_type == event_type)
            .count()
    }

    /// Contract ids in order of their first event.
    pub fn contract_ids(&self) -> Vec<String> {
        self.read().contracts.clone()
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }

    /// Verify the hash chain of one contract.  An unknown contract id has an
    /// empty, trivially valid chain.
    ///
    /// # Errors
    ///
    /// [`SpineError::ChainBroken`] at the first broken link.
    pub fn verify_chain(&self, contract_id: &str) -> Result<(), SpineError> {
        let state = self.read();
        verify_chain_of(contract_id, state.chain(contract_id))
    }

    /// Verify every chain in the log.
    ///
    /// # Errors
    ///
    /// [`SpineError::ChainBroken`] for the first contract that fails.
    pub fn verify_all(&self) -> Result<(), SpineError> {
        let state = self.read();
        for contract_id in &state.contracts {
            verify_chain_of(contract_id, state.chain(contract_id))?;
        }
        Ok(())
    }

    /// Every event in global append order.
    pub fn export(&self) -> Vec<Event> {
        self.read().events.clone()
    }

    /// [`EventLog::export`] as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// [`SpineError::Serialization`] if an event cannot be serialized.
    pub fn export_json(&self) -> Result<String, SpineError> {
        serde_json::to_string_pretty(&self.export())
            .map_err(|e| SpineError::Serialization(e.to_string()))
    }
}

/// Verify the chains contained in an arbitrary slice of events, grouped by
/// contract id and taken in slice order.
///
/// # Errors
///
/// [`SpineError::ChainBroken`] at the first broken link.
pub fn verify_events(events: &[Event]) -> Result<(), SpineError> {
    let mut order: Vec<&str> = Vec::new();
    let mut chains: HashMap<&str, Vec<&Event>> = HashMap::new();
    for event in events {
        chains
            .entry(event.contract_id.as_str())
            .or_insert_with(|| {
                order.push(event.contract_id.as_str());
                Vec::new()
            })
            .push(event);
    }
    for contract_id in order {
        verify_chain_of(contract_id, chains.remove(contract_id).unwrap_or_default())?;
    }
    Ok(())
}

fn verify_chain_of(contract_id: &str, chain: Vec<&Event>) -> Result<(), SpineError> {
    let broken = |position: usize, details: String| SpineError::ChainBroken {
        contract_id: contract_id.to_string(),
        position,
        details,
    };
    let mut expected_previous = "";
    for (position, event) in chain.into_iter().enumerate() {
        if event.previous_event_hash != expected_previous {
            return Err(broken(
                position,
                format!(
                    "previous hash '{}' does not match '{expected_previous}'",
                    event.previous_event_hash
                ),
            ));
        }
        if !event.is_intact() {
            return Err(broken(
                position,
                format!("event {} does not match its content hash", event.event_id),
            ));
        }
        expected_previous = &event.event_id;
    }
    Ok(())
}
