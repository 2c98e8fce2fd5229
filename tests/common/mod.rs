#![allow(dead_code)]

use blud_audit_ledger::audit::{Actor, AuditAction, AuditEntryInput};
use blud_audit_ledger::database::Database;
use blud_audit_ledger::AuditLedger;
use serde_json::json;

/// Ledger over a fresh in-memory database.
pub async fn setup_test_ledger() -> AuditLedger {
    let db = Database::new_in_memory()
        .await
        .expect("Failed to create test database");
    AuditLedger::new(db)
}

pub fn bendahara() -> Actor {
    Actor {
        user_id: Some("u-bendahara".to_string()),
        user_name: Some("Dewi Lestari".to_string()),
        user_nip: Some("198501012010012003".to_string()),
        user_role: Some("BENDAHARA_PENGELUARAN".to_string()),
        unit_kerja: Some("Sub Bagian Keuangan".to_string()),
    }
}

/// An SPP amount change, the bread-and-butter ledger row.
pub fn spp_update(index: usize) -> AuditEntryInput {
    AuditEntryInput::new(AuditAction::Update)
        .actor(bendahara())
        .subject(
            "SPP",
            format!("spp-{:04}", index),
            Some(format!("SPP-LS {:04}/2026", index)),
        )
        .snapshots(
            Some(json!({"amount": 100 * index, "status": "DRAFT"})),
            Some(json!({"amount": 150 * index, "status": "DRAFT"})),
        )
        .request(
            Some("10.20.30.40".to_string()),
            Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()),
        )
}

pub async fn append_many(ledger: &AuditLedger, count: usize) {
    for i in 1..=count {
        ledger
            .append(spp_update(i))
            .await
            .expect("append should succeed");
    }
}

/// Simulate someone with direct database access rewriting history:
/// drop the append-only triggers, then run `sql`.
pub async fn tamper(ledger: &AuditLedger, sql: &str) {
    let pool = ledger.database().pool();
    sqlx::query("DROP TRIGGER audit_log_no_update")
        .execute(pool)
        .await
        .expect("drop update trigger");
    sqlx::query("DROP TRIGGER audit_log_no_delete")
        .execute(pool)
        .await
        .expect("drop delete trigger");
    sqlx::query(sql).execute(pool).await.expect("tampering statement");
}
