use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::audit::entry::{format_timestamp, AuditAction, AuditLogEntry, AuditStatus};
use crate::database::models::AuditLogRow;
use crate::database::schema::AUDIT_LOG_COLUMNS;
use crate::error::Result;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Filter for the reporting listing. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub status: Option<AuditStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditLogFilter {
    pub fn page_size(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

pub struct Queries;

impl Queries {
    pub async fn get_entry(pool: &SqlitePool, id: &str) -> Result<Option<AuditLogEntry>> {
        let sql = format!("SELECT {} FROM audit_log WHERE id = ?", AUDIT_LOG_COLUMNS);
        let row = sqlx::query_as::<_, AuditLogRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.map(AuditLogEntry::try_from).transpose()
    }

    /// Newest row first.
    pub async fn list_entries(
        pool: &SqlitePool,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM audit_log WHERE 1 = 1",
            AUDIT_LOG_COLUMNS
        ));

        if let Some(entity_type) = &filter.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = &filter.entity_id {
            qb.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(user_id) = &filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(action) = filter.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        // Stored timestamps share one fixed-width UTC format, so text
        // comparison orders them chronologically.
        if let Some(since) = &filter.since {
            qb.push(" AND timestamp >= ").push_bind(format_timestamp(since));
        }
        if let Some(until) = &filter.until {
            qb.push(" AND timestamp <= ").push_bind(format_timestamp(until));
        }

        qb.push(" ORDER BY seq DESC LIMIT ")
            .push_bind(filter.page_size())
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows = qb.build_query_as::<AuditLogRow>().fetch_all(pool).await?;
        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    /// Raw rows with `from_seq <= seq <= to_seq`, oldest first, at most `limit`.
    pub async fn fetch_range(
        pool: &SqlitePool,
        from_seq: i64,
        to_seq: i64,
        limit: i64,
    ) -> Result<Vec<AuditLogRow>> {
        let sql = format!(
            "SELECT {} FROM audit_log WHERE seq >= ? AND seq <= ? ORDER BY seq ASC LIMIT ?",
            AUDIT_LOG_COLUMNS
        );
        let rows = sqlx::query_as::<_, AuditLogRow>(&sql)
            .bind(from_seq)
            .bind(to_seq)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// The row immediately before `seq` in insertion order.
    pub async fn predecessor(pool: &SqlitePool, seq: i64) -> Result<Option<AuditLogRow>> {
        let sql = format!(
            "SELECT {} FROM audit_log WHERE seq < ? ORDER BY seq DESC LIMIT 1",
            AUDIT_LOG_COLUMNS
        );
        let row = sqlx::query_as::<_, AuditLogRow>(&sql)
            .bind(seq)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn head(pool: &SqlitePool) -> Result<Option<AuditLogEntry>> {
        let sql = format!(
            "SELECT {} FROM audit_log ORDER BY seq DESC LIMIT 1",
            AUDIT_LOG_COLUMNS
        );
        let row = sqlx::query_as::<_, AuditLogRow>(&sql)
            .fetch_optional(pool)
            .await?;

        row.map(AuditLogEntry::try_from).transpose()
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Lowest and highest `seq` in the ledger.
    pub async fn seq_bounds(pool: &SqlitePool) -> Result<Option<(i64, i64)>> {
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(seq), MAX(seq) FROM audit_log")
                .fetch_one(pool)
                .await?;
        Ok(min.zip(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(AuditLogFilter::default().page_size(), DEFAULT_PAGE_SIZE);

        let filter = AuditLogFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);

        let filter = AuditLogFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.page_size(), 1);
    }
}
