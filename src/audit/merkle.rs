//! Checkpoint digests
//!
//! A Merkle root over the row hashes of a range, so an operator can record
//! a compact checkpoint outside the database and confirm the range later.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::audit::logger::AuditLedger;
use crate::audit::verify::VERIFY_BATCH_SIZE;
use crate::database::queries::Queries;
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub from_seq: i64,
    pub to_seq: i64,
    pub row_count: u64,
    pub merkle_root: String,
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Merkle root over leaf hashes; an odd node is paired with itself.
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [single] => hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }
    level.pop()
}

impl AuditLedger {
    /// Checkpoint over rows with `from_seq <= seq <= to_seq`; the returned
    /// bounds are the first and last rows actually covered.
    pub async fn checkpoint(&self, from_seq: i64, to_seq: i64) -> Result<Checkpoint> {
        if from_seq > to_seq {
            return Err(LedgerError::invalid_range(from_seq, to_seq));
        }

        let pool = self.database().pool();
        let mut leaves = Vec::new();
        let mut covered: Option<(i64, i64)> = None;
        let mut next_seq = from_seq;
        loop {
            let rows = Queries::fetch_range(pool, next_seq, to_seq, VERIFY_BATCH_SIZE).await?;
            let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
                break;
            };
            covered = Some((covered.map_or(first.seq, |(start, _)| start), last.seq));
            next_seq = last.seq + 1;
            leaves.extend(rows.into_iter().map(|row| row.hash));
        }

        let (Some((first_seq, last_seq)), Some(root)) = (covered, merkle_root(&leaves)) else {
            return Err(LedgerError::ValidationError(format!(
                "No ledger rows in range {}..={}",
                from_seq, to_seq
            )));
        };

        info!(
            "Checkpoint for seq {}..={} over {} rows: {}",
            first_seq,
            last_seq,
            leaves.len(),
            root
        );

        Ok(Checkpoint {
            from_seq: first_seq,
            to_seq: last_seq,
            row_count: leaves.len() as u64,
            merkle_root: root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sha256:{:064x}", i)).collect()
    }

    #[test]
    fn test_empty_has_no_root() {
        assert_eq!(merkle_root(&[]), None);
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), Some(l[0].clone()));
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        assert_eq!(merkle_root(&l), Some(hash_pair(&l[0], &l[1])));
    }

    #[test]
    fn test_odd_leaf_is_duplicated() {
        let l = leaves(3);
        let expected = hash_pair(&hash_pair(&l[0], &l[1]), &hash_pair(&l[2], &l[2]));
        assert_eq!(merkle_root(&l), Some(expected));
    }

    #[test]
    fn test_root_changes_with_any_leaf() {
        let l = leaves(7);
        let root = merkle_root(&l).unwrap();
        for i in 0..l.len() {
            let mut changed = l.clone();
            changed[i] = "sha256:forged".to_string();
            assert_ne!(merkle_root(&changed).unwrap(), root);
        }
    }
}
