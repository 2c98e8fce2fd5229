//! Audit Ledger Writer
//!
//! Appends rows to the `audit_log` table as the next link of the hash chain.
//! The predecessor hash is always read from storage inside the append
//! transaction; nothing about the chain is cached in process memory.

use sqlx::SqliteConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::entry::{AuditEntryInput, AuditLogEntry, GENESIS_HASH};
use crate::database::queries::{AuditLogFilter, Queries};
use crate::database::{self, Database};
use crate::error::{LedgerError, Result};

pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 5;

const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Writer and read facade over the ledger table.
#[derive(Clone)]
pub struct AuditLedger {
    db: Database,
    // Serializes appends issued from this process. Holds no chain state.
    write_gate: Arc<Mutex<()>>,
    max_attempts: u32,
}

impl AuditLedger {
    pub fn new(db: Database) -> Self {
        Self::with_max_attempts(db, DEFAULT_MAX_APPEND_ATTEMPTS)
    }

    pub fn with_max_attempts(db: Database, max_attempts: u32) -> Self {
        Self {
            db,
            write_gate: Arc::new(Mutex::new(())),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Append a completed action as the next chain link.
    ///
    /// Failed business actions are appended like any other
    /// (`AuditStatus::Failure`). Storage errors propagate; only chain
    /// contention from another writer is retried.
    ///
    /// The write runs on its own task, so dropping the returned future never
    /// abandons an open write transaction.
    pub async fn append(&self, input: AuditEntryInput) -> Result<AuditLogEntry> {
        let ledger = self.clone();
        tokio::spawn(async move { ledger.append_serialized(input).await })
            .await
            .map_err(|e| LedgerError::StorageUnavailable(format!("Append task failed: {}", e)))?
    }

    async fn append_serialized(&self, input: AuditEntryInput) -> Result<AuditLogEntry> {
        let _gate = self.write_gate.lock().await;

        let mut attempt = 1;
        loop {
            match self.try_append(input.clone()).await {
                Ok(entry) => {
                    debug!("Appended audit entry: {}", entry.summary());
                    return Ok(entry);
                }
                Err(AppendError::Contention(reason)) if attempt < self.max_attempts => {
                    warn!(
                        "Append attempt {}/{} lost the chain head to another writer: {}",
                        attempt, self.max_attempts, reason
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(AppendError::Contention(reason)) => {
                    warn!("Giving up append after {} attempts: {}", attempt, reason);
                    return Err(LedgerError::ConcurrentAppend(attempt));
                }
                Err(AppendError::Fatal(err)) => return Err(err),
            }
        }
    }

    async fn try_append(
        &self,
        input: AuditEntryInput,
    ) -> std::result::Result<AuditLogEntry, AppendError> {
        let mut conn = self.db.pool().acquire().await.map_err(AppendError::from)?;

        // Write lock first, then read the head.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(AppendError::from)?;

        let outcome = write_link(&mut *conn, input).await;
        if outcome.is_err() {
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                debug!("Rollback after failed append: {}", e);
            }
        }

        let entry = outcome?;
        if entry.is_genesis() {
            info!("Audit ledger started with genesis row {}", entry.id);
        }
        Ok(entry)
    }

    pub async fn get(&self, id: &str) -> Result<Option<AuditLogEntry>> {
        Queries::get_entry(self.db.pool(), id).await
    }

    pub async fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>> {
        Queries::list_entries(self.db.pool(), filter).await
    }

    pub async fn head(&self) -> Result<Option<AuditLogEntry>> {
        Queries::head(self.db.pool()).await
    }

    pub async fn count(&self) -> Result<i64> {
        Queries::count(self.db.pool()).await
    }
}

/// Seal and insert the next link, then commit. Runs inside `BEGIN IMMEDIATE`.
async fn write_link(
    conn: &mut SqliteConnection,
    input: AuditEntryInput,
) -> std::result::Result<AuditLogEntry, AppendError> {
    let prev_hash = database::last_hash(&mut *conn)
        .await?
        .unwrap_or_else(|| GENESIS_HASH.to_string());
    let timestamp = database::storage_now(&mut *conn).await?;

    let mut entry = AuditLogEntry::seal(input, prev_hash, timestamp);
    let seq = match database::insert_entry(&mut *conn, &entry).await {
        Ok(seq) => seq,
        Err(e) => return Err(AppendError::classify(e, &entry)),
    };
    entry.seq = seq;

    sqlx::query("COMMIT")
        .execute(&mut *conn)
        .await
        .map_err(AppendError::from)?;
    Ok(entry)
}

enum AppendError {
    Contention(String),
    Fatal(LedgerError),
}

impl AppendError {
    /// Another writer extended the chain first: either SQLite refused the
    /// write lock or the `prev_hash` unique index rejected a fork.
    fn classify(err: LedgerError, entry: &AuditLogEntry) -> Self {
        match err {
            LedgerError::StorageUnavailable(msg) if is_contention(&msg) => Self::Contention(format!(
                "prev_hash {} already taken or database locked ({})",
                entry.prev_hash, msg
            )),
            other => Self::Fatal(other),
        }
    }
}

impl From<LedgerError> for AppendError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::StorageUnavailable(msg) if is_contention(&msg) => Self::Contention(msg),
            other => Self::Fatal(other),
        }
    }
}

impl From<sqlx::Error> for AppendError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::from(err).into()
    }
}

fn is_contention(message: &str) -> bool {
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("UNIQUE constraint failed: audit_log.prev_hash")
}
