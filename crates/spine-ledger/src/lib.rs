//! `spine-ledger` – the audit trail.
//!
//! # Modules
//!
//! - [`log`] – [`EventLog`][log::EventLog]: in-memory, append-only store
//!   indexed globally and per contract id, with SHA-256 hash chaining and
//!   chain verification.
//! - [`archive`] – [`LedgerArchive`][archive::LedgerArchive]: SQLite
//!   persistence for exported events; rows are inserted once and never
//!   replaced.

pub mod archive;
pub mod log;

pub use archive::{ArchiveError, LedgerArchive};
pub use log::{EventLog, verify_events};
