//! SQLite-backed ledger archive.
//!
//! Persists exported [`Event`]s so an audit trail outlives the process.  The
//! archive is append-only: an event already stored under the same id is left
//! untouched, never replaced.
//!
//! # Storage layout
//!
//! | column              | type    | description                             |
//! |---------------------|---------|-----------------------------------------|
//! | seq                 | INTEGER | Global append order                     |
//! | event_id            | TEXT    | Content hash, unique                    |
//! | contract_id         | TEXT    | Owning contract                         |
//! | event_type          | TEXT    | Event type name                         |
//! | timestamp           | TEXT    | RFC-3339 time (UTC)                     |
//! | previous_event_hash | TEXT    | Chain link                              |
//! | body                | TEXT    | Full event as JSON                      |
//!
//! # Example
//!
//! ```rust
//! use spine_ledger::{EventLog, LedgerArchive, verify_events};
//! use spine_types::{EventData, EventType};
//!
//! let log = EventLog::new();
//! log.log_event(EventType::ContractsIssued, "c-1", EventData::new()).unwrap();
//!
//! let archive = LedgerArchive::open_in_memory().unwrap();
//! assert_eq!(archive.persist(&log.export()).unwrap(), 1);
//! assert_eq!(archive.persist(&log.export()).unwrap(), 0);
//!
//! let loaded = archive.load_all().unwrap();
//! assert!(verify_events(&loaded).is_ok());
//! ```

use std::path::Path;

use rusqlite::{Connection, params};
use spine_types::{Event, SpineError};
use thiserror::Error;
use tracing::info;

/// Errors that can arise from archive operations.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored event is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ArchiveError> for SpineError {
    fn from(e: ArchiveError) -> Self {
        SpineError::Archive(e.to_string())
    }
}

/// Append-only event archive on a SQLite connection.
pub struct LedgerArchive {
    conn: Connection,
}

impl LedgerArchive {
    /// Open (or create) a persistent archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path)?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    /// Open a temporary in-memory archive (useful for testing).
    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        let conn = Connection::open_in_memory()?;
        let archive = Self { conn };
        archive.init_schema()?;
        Ok(archive)
    }

    fn init_schema(&self) -> Result<(), ArchiveError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger_events (
                seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id            TEXT NOT NULL UNIQUE,
                contract_id         TEXT NOT NULL,
                event_type          TEXT NOT NULL,
                timestamp           TEXT NOT NULL,
                previous_event_hash TEXT NOT NULL,
                body                TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ledger_events_contract
                ON ledger_events (contract_id, seq);",
        )?;
        Ok(())
    }

    /// Store `events` in slice order inside one transaction.  Returns how
    /// many were newly inserted; events already present are skipped.
    pub fn persist(&self, events: &[Event]) -> Result<usize, ArchiveError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ledger_events
                     (event_id, contract_id, event_type, timestamp, previous_event_hash, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.event_id,
                    event.contract_id,
                    event.event_type.as_str(),
                    event.timestamp.to_rfc3339(),
                    event.previous_event_hash,
                    serde_json::to_string(event)?,
                ])?;
            }
        }
        tx.commit()?;
        info!(inserted, offered = events.len(), "ledger events archived");
        Ok(inserted)
    }

    /// Every archived event in original append order.
    pub fn load_all(&self) -> Result<Vec<Event>, ArchiveError> {
        self.query("SELECT body FROM ledger_events ORDER BY seq ASC", [])
    }

    /// Archived events of one contract, oldest first.
    pub fn load_contract(&self, contract_id: &str) -> Result<Vec<Event>, ArchiveError> {
        self.query(
            "SELECT body FROM ledger_events WHERE contract_id = ?1 ORDER BY seq ASC",
            [contract_id],
        )
    }

    pub fn count(&self) -> Result<usize, ArchiveError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_events", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    fn query<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Event>, ArchiveError> {
        let mut stmt = self.conn.prepare(sql)?;
        let bodies = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(ArchiveError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{EventLog, verify_events};
    use serde_json::json;
    use spine_types::{EventData, EventType};

    fn sample_log() -> EventLog {
        let log = EventLog::new();
        for (n, id) in ["a", "b", "a"].iter().enumerate() {
            log.log_event(
                EventType::AuditLogged,
                id,
                EventData::from([("n".to_string(), json!(n))]),
            )
            .unwrap();
        }
        log
    }

    #[test]
    fn persist_then_load_preserves_order_and_ids() {
        let log = sample_log();
        let archive = LedgerArchive::open_in_memory().unwrap();
        assert_eq!(archive.persist(&log.export()).unwrap(), 3);
        let loaded = archive.load_all().unwrap();
        assert_eq!(loaded, log.export());
        assert!(verify_events(&loaded).is_ok());
    }

    #[test]
    fn load_contract_filters_by_id() {
        let archive = LedgerArchive::open_in_memory().unwrap();
        archive.persist(&sample_log().export()).unwrap();
        let a = archive.load_contract("a").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].previous_event_hash, a[0].event_id);
        assert!(archive.load_contract("zzz").unwrap().is_empty());
    }

    #[test]
    fn existing_rows_are_never_replaced() {
        let log = sample_log();
        let archive = LedgerArchive::open_in_memory().unwrap();
        archive.persist(&log.export()).unwrap();

        let mut forged = log.export();
        forged[0].payload.insert("n".to_string(), json!(42));
        assert_eq!(archive.persist(&forged).unwrap(), 0);
        assert_eq!(archive.load_all().unwrap(), log.export());
        assert_eq!(archive.count().unwrap(), 3);
    }

    #[test]
    fn file_archive_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let log = sample_log();
        {
            let archive = LedgerArchive::open(&path).unwrap();
            archive.persist(&log.export()).unwrap();
        }
        let reopened = LedgerArchive::open(&path).unwrap();
        let restored = EventLog::restore(reopened.load_all().unwrap()).unwrap();
        assert_eq!(restored.contract_ids(), vec!["a", "b"]);
    }

    #[test]
    fn archive_error_maps_to_spine_error() {
        let err = ArchiveError::from(serde_json::from_str::<Event>("{").unwrap_err());
        assert!(matches!(SpineError::from(err), SpineError::Archive(_)));
    }
}
