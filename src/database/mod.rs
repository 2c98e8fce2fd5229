pub mod models;
pub mod queries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::audit::entry::{canonical_json, format_timestamp, AuditLogEntry};
use crate::error::{LedgerError, Result};

/// Connection settings for the ledger database.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, &DatabaseOptions::default()).await
    }

    pub async fn connect(database_url: &str, options: &DatabaseOptions) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await?;

        info!("Connected to ledger database at {}", database_url);
        Ok(Database { pool })
    }

    /// Open an existing ledger without the ability to write to it.
    pub async fn open_read_only(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        info!("Opened ledger database at {} read-only", database_url);
        Ok(Database { pool })
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn new_in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Ledger migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Hash of the most recently inserted row, if any.
pub(crate) async fn last_hash(conn: &mut SqliteConnection) -> Result<Option<String>> {
    let hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY seq DESC LIMIT 1")
            .fetch_optional(conn)
            .await?;
    Ok(hash)
}

/// Current time according to the storage engine's clock.
pub(crate) async fn storage_now(conn: &mut SqliteConnection) -> Result<chrono::DateTime<chrono::Utc>> {
    let now: String = sqlx::query_scalar("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')")
        .fetch_one(conn)
        .await?;

    chrono::DateTime::parse_from_rfc3339(&now)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|e| LedgerError::StorageUnavailable(format!("Unreadable storage clock {:?}: {}", now, e)))
}

/// Insert a sealed entry and return its assigned `seq`.
pub(crate) async fn insert_entry(conn: &mut SqliteConnection, entry: &AuditLogEntry) -> Result<i64> {
    let changed = serde_json::Value::Array(
        entry
            .changed_fields
            .iter()
            .cloned()
            .map(serde_json::Value::String)
            .collect(),
    );

    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, user_id, user_name, user_nip, user_role, unit_kerja,
            action, entity_type, entity_id, entity_label,
            old_value, new_value, changed_fields,
            reason, status, error_message,
            ip_address, user_agent, browser_name, os_name,
            timestamp, hash, prev_hash
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(&entry.user_name)
    .bind(&entry.user_nip)
    .bind(&entry.user_role)
    .bind(&entry.unit_kerja)
    .bind(entry.action.as_str())
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.entity_label)
    .bind(entry.old_value.as_ref().map(canonical_json))
    .bind(entry.new_value.as_ref().map(canonical_json))
    .bind(canonical_json(&changed))
    .bind(&entry.reason)
    .bind(entry.status.as_str())
    .bind(&entry.error_message)
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(&entry.browser_name)
    .bind(&entry.os_name)
    .bind(format_timestamp(&entry.timestamp))
    .bind(&entry.hash)
    .bind(&entry.prev_hash)
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new_in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_storage_clock_is_parseable() {
        let db = Database::new_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let now = storage_now(&mut conn).await.unwrap();
        assert!((chrono::Utc::now() - now).num_seconds().abs() < 60);
    }

    #[tokio::test]
    async fn test_unknown_action_rejected_by_check_constraint() {
        let db = Database::new_in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO audit_log (id, action, hash, prev_hash) VALUES ('x', 'PUBLISH', 'sha256:1', 'sha256:0')",
        )
        .execute(db.pool())
        .await;
        assert!(result.is_err());
    }
}
