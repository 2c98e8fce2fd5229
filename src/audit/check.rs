//! Operator-facing ledger check: chain verification over a range plus an
//! optional comparison against a recorded checkpoint.

use tracing::{info, warn};

use crate::audit::logger::AuditLedger;
use crate::audit::merkle::Checkpoint;
use crate::audit::verify::VerificationResult;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub from_seq: Option<i64>,
    pub to_seq: Option<i64>,
    /// Merkle root recorded earlier for the same range.
    pub expected_checkpoint: Option<String>,
}

impl CheckOptions {
    pub fn bounds(&self) -> (i64, i64) {
        (self.from_seq.unwrap_or(1), self.to_seq.unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Chain intact and, when one was given, the checkpoint matched.
    Passed {
        result: VerificationResult,
        checkpoint: Option<Checkpoint>,
    },
    Broken(VerificationResult),
    CheckpointMismatch {
        expected: String,
        actual: Option<Checkpoint>,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed { .. })
    }

    /// Process exit status for the verification binary.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        match self {
            CheckOutcome::Passed { result, checkpoint } => match checkpoint {
                Some(cp) => format!(
                    "{}; checkpoint matches over seq {}..={}",
                    result.summary(),
                    cp.from_seq,
                    cp.to_seq
                ),
                None => result.summary(),
            },
            CheckOutcome::Broken(result) => result.summary(),
            CheckOutcome::CheckpointMismatch { expected, actual } => match actual {
                Some(cp) => format!(
                    "Checkpoint mismatch over seq {}..={}. Expected: {}, Got: {}",
                    cp.from_seq, cp.to_seq, expected, cp.merkle_root
                ),
                None => format!("Checkpoint mismatch. Expected: {}, range is empty", expected),
            },
        }
    }
}

/// Verify `options`' range and compare its checkpoint if one was supplied.
///
/// An empty ledger or range passes verification with zero rows checked,
/// matching `AuditLedger::verify_all`; an expected checkpoint over an empty
/// range is a mismatch.
pub async fn check_ledger(ledger: &AuditLedger, options: &CheckOptions) -> Result<CheckOutcome> {
    let (from_seq, to_seq) = options.bounds();
    let result = ledger.verify(from_seq, to_seq).await?;

    if !result.is_valid() {
        return Ok(CheckOutcome::Broken(result));
    }

    let Some(expected) = options.expected_checkpoint.as_deref() else {
        return Ok(CheckOutcome::Passed {
            result,
            checkpoint: None,
        });
    };

    let rows_checked = match &result {
        VerificationResult::Valid { rows_checked, .. } => *rows_checked,
        VerificationResult::Broken { .. } => 0,
    };
    if rows_checked == 0 {
        warn!("No ledger rows in seq {}..={} to checkpoint", from_seq, to_seq);
        return Ok(CheckOutcome::CheckpointMismatch {
            expected: expected.to_string(),
            actual: None,
        });
    }

    let checkpoint = ledger.checkpoint(from_seq, to_seq).await?;
    if checkpoint.merkle_root != expected {
        warn!(
            target: "security",
            "Checkpoint mismatch over seq {}..={}: expected {}, got {}",
            checkpoint.from_seq, checkpoint.to_seq, expected, checkpoint.merkle_root
        );
        return Ok(CheckOutcome::CheckpointMismatch {
            expected: expected.to_string(),
            actual: Some(checkpoint),
        });
    }

    info!("Checkpoint matches over {} rows", checkpoint.row_count);
    Ok(CheckOutcome::Passed {
        result,
        checkpoint: Some(checkpoint),
    })
}
