// The ledger table, its CHECK constraints and the append-only triggers
// all live in migrations/001_audit_ledger.sql.

/// Columns selected for every ledger read, in table order.
pub const AUDIT_LOG_COLUMNS: &str = "seq, id, user_id, user_name, user_nip, user_role, \
     unit_kerja, action, entity_type, entity_id, entity_label, old_value, new_value, \
     changed_fields, reason, status, error_message, ip_address, user_agent, browser_name, \
     os_name, timestamp, hash, prev_hash";
