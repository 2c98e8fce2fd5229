use blud_audit_ledger::audit::{check_ledger, CheckOptions, CheckOutcome, VerificationResult};
use blud_audit_ledger::database::Database;
use blud_audit_ledger::AuditLedger;
use tempfile::TempDir;

mod common;
use common::*;

/// A ledger file with `rows` rows, plus a read-only handle on it like the
/// verification binary opens.
async fn ledger_file(rows: usize) -> (TempDir, AuditLedger, AuditLedger) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("audit.db").display());

    let db = Database::new(&url).await.unwrap();
    db.run_migrations().await.unwrap();
    let writer = AuditLedger::new(db);
    append_many(&writer, rows).await;

    let reader = AuditLedger::new(Database::open_read_only(&url).await.unwrap());
    (dir, writer, reader)
}

#[tokio::test]
async fn test_intact_ledger_passes() {
    let (_dir, _writer, reader) = ledger_file(6).await;

    let outcome = check_ledger(&reader, &CheckOptions::default()).await.unwrap();
    assert!(outcome.passed());
    assert_eq!(outcome.exit_code(), 0);
    assert!(matches!(
        outcome,
        CheckOutcome::Passed {
            result: VerificationResult::Valid { rows_checked: 6, .. },
            checkpoint: None,
        }
    ));
}

#[tokio::test]
async fn test_range_is_respected() {
    let (_dir, _writer, reader) = ledger_file(10).await;

    let options = CheckOptions {
        from_seq: Some(4),
        to_seq: Some(7),
        ..Default::default()
    };
    let outcome = check_ledger(&reader, &options).await.unwrap();
    assert!(matches!(
        outcome,
        CheckOutcome::Passed {
            result: VerificationResult::Valid { rows_checked: 4, .. },
            ..
        }
    ));

    let options = CheckOptions {
        from_seq: Some(7),
        to_seq: Some(4),
        ..Default::default()
    };
    assert!(check_ledger(&reader, &options).await.is_err());
}

#[tokio::test]
async fn test_tampered_ledger_exits_nonzero() {
    let (_dir, writer, reader) = ledger_file(6).await;
    tamper(&writer, "UPDATE audit_log SET reason = 'backdated' WHERE seq = 3").await;

    let outcome = check_ledger(&reader, &CheckOptions::default()).await.unwrap();
    assert_eq!(outcome.exit_code(), 1);
    match outcome {
        CheckOutcome::Broken(result) => assert_eq!(result.broken_at(), Some(3)),
        other => panic!("expected a broken chain, got {:?}", other),
    }

    // A range that stops before the tampered row still verifies.
    let options = CheckOptions {
        to_seq: Some(2),
        ..Default::default()
    };
    assert!(check_ledger(&reader, &options).await.unwrap().passed());
}

#[tokio::test]
async fn test_checkpoint_comparison() {
    let (_dir, writer, reader) = ledger_file(5).await;
    let recorded = writer.checkpoint(2, 5).await.unwrap();

    let options = CheckOptions {
        from_seq: Some(2),
        to_seq: Some(5),
        expected_checkpoint: Some(recorded.merkle_root.clone()),
    };
    let outcome = check_ledger(&reader, &options).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        outcome,
        CheckOutcome::Passed {
            result: reader.verify(2, 5).await.unwrap(),
            checkpoint: Some(recorded.clone()),
        }
    );

    let options = CheckOptions {
        expected_checkpoint: Some("sha256:not-the-root".to_string()),
        ..options
    };
    let outcome = check_ledger(&reader, &options).await.unwrap();
    assert_eq!(outcome.exit_code(), 1);
    assert!(matches!(
        outcome,
        CheckOutcome::CheckpointMismatch { actual: Some(ref cp), .. } if cp.merkle_root == recorded.merkle_root
    ));
}

#[tokio::test]
async fn test_empty_ledger_verifies_like_verify_all() {
    let (_dir, _writer, reader) = ledger_file(0).await;

    let outcome = check_ledger(&reader, &CheckOptions::default()).await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        outcome,
        CheckOutcome::Passed {
            result: reader.verify_all().await.unwrap(),
            checkpoint: None,
        }
    );

    let options = CheckOptions {
        expected_checkpoint: Some("sha256:anything".to_string()),
        ..Default::default()
    };
    let outcome = check_ledger(&reader, &options).await.unwrap();
    assert_eq!(
        outcome,
        CheckOutcome::CheckpointMismatch {
            expected: "sha256:anything".to_string(),
            actual: None,
        }
    );
}
