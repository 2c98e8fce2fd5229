//! Audit Log Verification
//!
//! Re-walks the hash chain in insertion order. Every row is checked twice:
//! its stored `prev_hash` must equal the previous row's stored `hash`, and
//! its stored `hash` must equal the digest recomputed from its content.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::audit::entry::{AuditLogEntry, GENESIS_HASH};
use crate::audit::logger::AuditLedger;
use crate::database::models::AuditLogRow;
use crate::database::queries::Queries;
use crate::error::{LedgerError, Result};

/// Rows read per round trip while walking a range.
pub const VERIFY_BATCH_SIZE: i64 = 1000;

/// Why a row failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakReason {
    /// Stored `hash` does not match the row's content.
    ContentMismatch { expected: String, stored: String },
    /// Stored `prev_hash` does not match the predecessor's stored `hash`.
    LinkMismatch { expected: String, stored: String },
    /// The row could not be decoded at all.
    Malformed { detail: String },
}

impl BreakReason {
    pub fn describe(&self) -> String {
        match self {
            BreakReason::ContentMismatch { expected, stored } => format!(
                "content mismatch: recomputed {}, stored {}",
                expected, stored
            ),
            BreakReason::LinkMismatch { expected, stored } => format!(
                "chain-link mismatch: expected prev_hash {}, stored {}",
                expected, stored
            ),
            BreakReason::Malformed { detail } => format!("malformed row: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerificationResult {
    Valid {
        rows_checked: u64,
        head_hash: Option<String>,
    },
    Broken {
        seq: i64,
        id: String,
        reason: BreakReason,
        rows_checked: u64,
    },
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid { .. })
    }

    /// Seq of the first broken row, if any.
    pub fn broken_at(&self) -> Option<i64> {
        match self {
            VerificationResult::Broken { seq, .. } => Some(*seq),
            VerificationResult::Valid { .. } => None,
        }
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            VerificationResult::Valid { rows_checked, .. } => {
                format!("Audit ledger is valid ({} rows checked)", rows_checked)
            }
            VerificationResult::Broken {
                seq, id, reason, ..
            } => format!(
                "Audit ledger is BROKEN at seq {} (id {}): {}",
                seq,
                id,
                reason.describe()
            ),
        }
    }

    /// `ChainViolation` for a broken result.
    pub fn into_error(self) -> Option<LedgerError> {
        match self {
            VerificationResult::Broken { seq, reason, .. } => Some(LedgerError::ChainViolation {
                seq,
                reason: reason.describe(),
            }),
            VerificationResult::Valid { .. } => None,
        }
    }
}

/// Walks rows in order, carrying the expected `prev_hash` forward.
struct ChainWalker {
    expected_prev: String,
    rows_checked: u64,
}

impl ChainWalker {
    fn starting_after(predecessor_hash: Option<String>) -> Self {
        Self {
            expected_prev: predecessor_hash.unwrap_or_else(|| GENESIS_HASH.to_string()),
            rows_checked: 0,
        }
    }

    fn check(&mut self, entry: &AuditLogEntry) -> Option<BreakReason> {
        if entry.prev_hash != self.expected_prev {
            return Some(BreakReason::LinkMismatch {
                expected: self.expected_prev.clone(),
                stored: entry.prev_hash.clone(),
            });
        }

        let recomputed = entry.calculate_hash();
        if recomputed != entry.hash {
            return Some(BreakReason::ContentMismatch {
                expected: recomputed,
                stored: entry.hash.clone(),
            });
        }

        self.expected_prev = entry.hash.clone();
        self.rows_checked += 1;
        None
    }

    fn broken(&self, seq: i64, id: String, reason: BreakReason) -> VerificationResult {
        VerificationResult::Broken {
            seq,
            id,
            reason,
            rows_checked: self.rows_checked,
        }
    }

    fn finish(self) -> VerificationResult {
        let head_hash = if self.rows_checked > 0 {
            Some(self.expected_prev)
        } else {
            None
        };
        VerificationResult::Valid {
            rows_checked: self.rows_checked,
            head_hash,
        }
    }
}

/// Verify in-memory rows that directly follow `predecessor_hash`
/// (`None` means the rows start at the beginning of the ledger).
pub fn verify_chain(predecessor_hash: Option<&str>, entries: &[AuditLogEntry]) -> VerificationResult {
    let mut walker = ChainWalker::starting_after(predecessor_hash.map(str::to_string));
    for entry in entries {
        if let Some(reason) = walker.check(entry) {
            return walker.broken(entry.seq, entry.id.clone(), reason);
        }
    }
    walker.finish()
}

/// Positions of entries whose stored hash does not match their content.
pub fn find_tampered_entries(entries: &[AuditLogEntry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|entry| !entry.verify_hash())
        .map(|entry| entry.seq)
        .collect()
}

impl AuditLedger {
    /// Verify rows with `from_seq <= seq <= to_seq`.
    ///
    /// The row just before `from_seq` anchors the first link check; with no
    /// such row the range must start from the genesis sentinel.
    pub async fn verify(&self, from_seq: i64, to_seq: i64) -> Result<VerificationResult> {
        if from_seq > to_seq {
            return Err(LedgerError::invalid_range(from_seq, to_seq));
        }

        let pool = self.database().pool();
        let predecessor = Queries::predecessor(pool, from_seq).await?;
        let mut walker = ChainWalker::starting_after(predecessor.map(|row| row.hash));

        let mut next_seq = from_seq;
        loop {
            let rows = Queries::fetch_range(pool, next_seq, to_seq, VERIFY_BATCH_SIZE).await?;
            let Some(last_seq) = rows.last().map(|row| row.seq) else {
                break;
            };
            debug!("Verifying {} rows from seq {}", rows.len(), next_seq);

            for row in rows {
                if let Some(result) = check_row(&mut walker, row) {
                    error!(
                        target: "security",
                        "Audit ledger tampering detected: {}",
                        result.summary()
                    );
                    return Ok(result);
                }
            }
            next_seq = last_seq + 1;
        }

        let result = walker.finish();
        info!("{} (seq {}..={})", result.summary(), from_seq, to_seq);
        Ok(result)
    }

    /// Verify the whole ledger.
    pub async fn verify_all(&self) -> Result<VerificationResult> {
        match Queries::seq_bounds(self.database().pool()).await? {
            Some((first, last)) => self.verify(first, last).await,
            None => Ok(VerificationResult::Valid {
                rows_checked: 0,
                head_hash: None,
            }),
        }
    }
}

fn check_row(walker: &mut ChainWalker, row: AuditLogRow) -> Option<VerificationResult> {
    let seq = row.seq;
    let id = row.id.clone();
    match AuditLogEntry::try_from(row) {
        Ok(entry) => walker
            .check(&entry)
            .map(|reason| walker.broken(seq, id, reason)),
        Err(e) => Some(walker.broken(
            seq,
            id,
            BreakReason::Malformed {
                detail: e.to_string(),
            },
        )),
    }
}
