//! Append-only audit trail for every terminal security and robot-safety
//! decision.
//!
//! An [`AuditRecord`] is immutable once created; nothing in this crate ever
//! rewrites or deletes one. [`JsonlAuditLog`] is the production sink, a
//! line-delimited JSON file opened in append mode. [`InMemoryAuditLog`]
//! backs tests and any caller that wants to inspect what was written without
//! touching disk. Both implement [`AuditSink`], so callers depend on the
//! trait, not the concrete sink.

#![deny(unsafe_code)]

use risk_classifier::RiskLevel;
use serde::{Deserialize, Serialize};
use sh_core::ids::{next_monotonic_id, now_ms};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised while writing or reading the audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The underlying file could not be opened, written, or read.
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record could not be parsed back out of the log.
    #[error("audit log serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The terminal disposition recorded for a command or motion decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action was allowed to proceed.
    Allowed,
    /// The action was refused outright.
    Blocked,
    /// A human approved a flagged action.
    Approved,
    /// A human (or the non-interactive fallback) denied a flagged action.
    Denied,
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic sequence number assigned at append time.
    pub id: u64,
    /// Milliseconds since the epoch at which the decision was made.
    pub timestamp_ms: u64,
    /// The acting user's identifier.
    pub actor: String,
    /// The command or motion description this record concerns.
    pub command: String,
    /// The risk level that drove the decision.
    pub risk_level: RiskLevel,
    /// What happened.
    pub outcome: AuditOutcome,
    /// Human-readable explanation.
    pub reason: String,
}

impl AuditRecord {
    /// Build a record stamped with the current time and a fresh sequence id.
    #[must_use]
    pub fn new(
        actor: impl Into<String>,
        command: impl Into<String>,
        risk_level: RiskLevel,
        outcome: AuditOutcome,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: next_monotonic_id(),
            timestamp_ms: now_ms(),
            actor: actor.into(),
            command: command.into(),
            risk_level,
            outcome,
            reason: reason.into(),
        }
    }
}

/// A destination for audit records. Implementations must be safe to share
/// across threads; a write failure must propagate so the caller can fail
/// closed rather than silently lose the record.
pub trait AuditSink: Send + Sync {
    /// Durably record `record`.
    ///
    /// # Errors
    /// Returns an error if the record could not be written.
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Line-delimited JSON file, opened in append mode. Each line is one
/// [`AuditRecord`].
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: String,
}

impl JsonlAuditLog {
    /// Open (creating if necessary) the audit log at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let p = path.as_ref();
        if !p.exists() {
            OpenOptions::new().create(true).write(true).truncate(true).open(p)?;
        }
        Ok(Self { path: p.to_string_lossy().into_owned() })
    }

    /// Read every record currently in the log, in append order.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line fails to parse.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let line = serde_json::to_string(&record)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// In-memory audit sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    /// Construct an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every record appended so far, in append order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit log lock poisoned").clone()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().expect("audit log lock poisoned").push(record);
        Ok(())
    }
}
