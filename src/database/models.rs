use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use crate::audit::entry::{canonical_json, format_timestamp, AuditAction, AuditLogEntry, AuditStatus};
use crate::error::LedgerError;

/// Raw `audit_log` row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub seq: i64,
    pub id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_nip: Option<String>,
    pub user_role: Option<String>,
    pub unit_kerja: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_label: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_fields: Option<String>,
    pub reason: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser_name: Option<String>,
    pub os_name: Option<String>,
    pub timestamp: String,
    pub hash: String,
    pub prev_hash: Option<String>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = LedgerError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let action: AuditAction = row.action.parse()?;
        let status: AuditStatus = row.status.parse()?;
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| {
                LedgerError::SerializationError(format!(
                    "Invalid timestamp {:?} at seq {}: {}",
                    row.timestamp, row.seq, e
                ))
            })?
            .with_timezone(&Utc);
        require_canonical(row.seq, "timestamp", &row.timestamp, &format_timestamp(&timestamp))?;

        let raw_changed = row.changed_fields.as_deref().ok_or_else(|| {
            LedgerError::SerializationError(format!("Missing changed_fields at seq {}", row.seq))
        })?;
        let changed_fields: Vec<String> = serde_json::from_str(raw_changed)?;
        let rendered = canonical_json(&Value::Array(
            changed_fields.iter().cloned().map(Value::String).collect(),
        ));
        require_canonical(row.seq, "changed_fields", raw_changed, &rendered)?;

        let old_value = parse_json(row.seq, "old_value", row.old_value.as_deref())?;
        let new_value = parse_json(row.seq, "new_value", row.new_value.as_deref())?;

        Ok(AuditLogEntry {
            seq: row.seq,
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_nip: row.user_nip,
            user_role: row.user_role,
            unit_kerja: row.unit_kerja,
            action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            entity_label: row.entity_label,
            old_value,
            new_value,
            changed_fields,
            reason: row.reason,
            status,
            error_message: row.error_message,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            browser_name: row.browser_name,
            os_name: row.os_name,
            timestamp,
            hash: row.hash,
            // A NULL here can only come from a row written outside `append`;
            // the empty string never matches a real link.
            prev_hash: row.prev_hash.unwrap_or_default(),
        })
    }
}

/// Stored JSON must be exactly the canonical text that was hashed.
fn parse_json(seq: i64, column: &str, raw: Option<&str>) -> Result<Option<Value>, LedgerError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw)?;
    require_canonical(seq, column, raw, &canonical_json(&value))?;
    Ok(Some(value))
}

/// Stored text must be the exact spelling the row was hashed with.
fn require_canonical(seq: i64, column: &str, stored: &str, canonical: &str) -> Result<(), LedgerError> {
    if stored == canonical {
        Ok(())
    } else {
        Err(LedgerError::SerializationError(format!(
            "Non-canonical {} at seq {}: stored {:?}, expected {:?}",
            column, seq, stored, canonical
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_accepted() {
        let value = parse_json(1, "new_value", Some(r#"{"amount":300,"status":"DRAFT"}"#)).unwrap();
        assert_eq!(value, Some(serde_json::json!({"status": "DRAFT", "amount": 300})));
        assert_eq!(parse_json(1, "old_value", None).unwrap(), None);
    }

    #[test]
    fn test_respelled_json_rejected() {
        for raw in [
            r#" {"amount":300,"status":"DRAFT"}"#,
            r#"{"status":"DRAFT","amount":300}"#,
            r#"{ "amount" : 300, "status" : "DRAFT" }"#,
        ] {
            assert!(
                matches!(
                    parse_json(2, "new_value", Some(raw)),
                    Err(LedgerError::SerializationError(_))
                ),
                "{:?} accepted",
                raw
            );
        }
    }

    #[test]
    fn test_respelled_timestamp_rejected() {
        assert!(require_canonical(
            2,
            "timestamp",
            "2026-01-31T08:15:00.000+00:00",
            "2026-01-31T08:15:00.000Z"
        )
        .is_err());
    }
}
