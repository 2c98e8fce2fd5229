//! Audit Ledger
//!
//! Append-only, tamper-evident record of every tracked action, chained by
//! SHA-256 hash to its predecessor in insertion order.

pub mod changes;
pub mod check;
pub mod entry;
pub mod logger;
pub mod merkle;
pub mod user_agent;
pub mod verify;

pub use check::{check_ledger, CheckOptions, CheckOutcome};
pub use entry::{
    Actor, AppendRequest, AuditAction, AuditEntryInput, AuditLogEntry, AuditStatus,
    RequestContext, Subject, GENESIS_HASH,
};
pub use logger::AuditLedger;
pub use merkle::{merkle_root, Checkpoint};
pub use verify::{verify_chain, BreakReason, VerificationResult};
