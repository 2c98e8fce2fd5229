//! Audit Log Entry
//!
//! Defines the ledger row, its closed vocabularies, and the canonical
//! serialization that feeds the SHA-256 hash chain.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::audit::changes::changed_fields;
use crate::audit::user_agent::ClientInfo;
use crate::error::LedgerError;

/// `prev_hash` of the first row in the ledger.
pub const GENESIS_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// Verb recorded for a tracked action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Submit,
    Verify,
    Approve,
    Reject,
    Login,
    Logout,
    Export,
}

impl AuditAction {
    pub const ALL: [AuditAction; 10] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::Submit,
        AuditAction::Verify,
        AuditAction::Approve,
        AuditAction::Reject,
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Submit => "SUBMIT",
            AuditAction::Verify => "VERIFY",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::Export => "EXPORT",
        }
    }
}

impl FromStr for AuditAction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| LedgerError::unknown_action(s))
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    #[default]
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failure => "FAILURE",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(AuditStatus::Success),
            "FAILURE" => Ok(AuditStatus::Failure),
            other => Err(LedgerError::unknown_status(other)),
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed the action, snapshotted at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_nip: Option<String>,
    pub user_role: Option<String>,
    pub unit_kerja: Option<String>,
}

/// What the action was performed on, snapshotted at write time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Description of a completed action, as handed to `AuditLedger::append`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntryInput {
    pub actor: Actor,
    pub action: AuditAction,
    pub subject: Subject,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub request: RequestContext,
}

impl AuditEntryInput {
    pub fn new(action: AuditAction) -> Self {
        Self {
            actor: Actor::default(),
            action,
            subject: Subject::default(),
            old_value: None,
            new_value: None,
            reason: None,
            status: AuditStatus::Success,
            error_message: None,
            request: RequestContext::default(),
        }
    }

    pub fn actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn subject(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        entity_label: Option<String>,
    ) -> Self {
        self.subject = Subject {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            entity_label,
        };
        self
    }

    pub fn snapshots(mut self, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Mark the recorded action as failed.
    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.status = AuditStatus::Failure;
        self.error_message = Some(error_message.into());
        self
    }

    pub fn request(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.request = RequestContext {
            ip_address,
            user_agent,
        };
        self
    }
}

/// Untyped append request, as received over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppendRequest {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_nip: Option<String>,
    pub user_role: Option<String>,
    pub unit_kerja: Option<String>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_label: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl TryFrom<AppendRequest> for AuditEntryInput {
    type Error = LedgerError;

    fn try_from(req: AppendRequest) -> Result<Self, Self::Error> {
        let action = req.action.trim().to_uppercase().parse::<AuditAction>()?;
        let status = match req.status.as_deref() {
            Some(s) => s.trim().to_uppercase().parse::<AuditStatus>()?,
            None => AuditStatus::Success,
        };

        Ok(Self {
            actor: Actor {
                user_id: req.user_id,
                user_name: req.user_name,
                user_nip: req.user_nip,
                user_role: req.user_role,
                unit_kerja: req.unit_kerja,
            },
            action,
            subject: Subject {
                entity_type: req.entity_type,
                entity_id: req.entity_id,
                entity_label: req.entity_label,
            },
            old_value: req.old_value,
            new_value: req.new_value,
            reason: req.reason,
            status,
            error_message: req.error_message,
            request: RequestContext {
                ip_address: req.ip_address,
                user_agent: req.user_agent,
            },
        })
    }
}

/// A sealed ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub seq: i64,
    pub id: String,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_nip: Option<String>,
    pub user_role: Option<String>,
    pub unit_kerja: Option<String>,
    pub action: AuditAction,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub entity_label: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub changed_fields: Vec<String>,
    pub reason: Option<String>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser_name: Option<String>,
    pub os_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub prev_hash: String,
}

impl AuditLogEntry {
    /// Build the next chain link for `input` on top of `prev_hash`.
    ///
    /// `seq` stays 0 until storage assigns it.
    pub fn seal(input: AuditEntryInput, prev_hash: String, timestamp: DateTime<Utc>) -> Self {
        let changed = changed_fields(input.old_value.as_ref(), input.new_value.as_ref());
        let client = input
            .request
            .user_agent
            .as_deref()
            .map(ClientInfo::parse)
            .unwrap_or_default();

        let mut entry = Self {
            seq: 0,
            id: Uuid::new_v4().to_string(),
            user_id: input.actor.user_id,
            user_name: input.actor.user_name,
            user_nip: input.actor.user_nip,
            user_role: input.actor.user_role,
            unit_kerja: input.actor.unit_kerja,
            action: input.action,
            entity_type: input.subject.entity_type,
            entity_id: input.subject.entity_id,
            entity_label: input.subject.entity_label,
            old_value: input.old_value,
            new_value: input.new_value,
            changed_fields: changed,
            reason: input.reason,
            status: input.status,
            error_message: input.error_message,
            ip_address: input.request.ip_address,
            user_agent: input.request.user_agent,
            browser_name: client.browser,
            os_name: client.os,
            timestamp,
            hash: String::new(),
            prev_hash,
        };

        entry.hash = entry.calculate_hash();
        entry
    }

    /// Canonical string representation for hashing.
    ///
    /// The field order is frozen; reordering breaks every stored row.
    pub fn canonical_string(&self) -> String {
        let changed: Vec<Value> = self
            .changed_fields
            .iter()
            .map(|f| Value::String(f.clone()))
            .collect();

        let fields: [(&str, String); 22] = [
            ("id", text(Some(self.id.as_str()))),
            ("user_id", text(self.user_id.as_deref())),
            ("user_name", text(self.user_name.as_deref())),
            ("user_nip", text(self.user_nip.as_deref())),
            ("user_role", text(self.user_role.as_deref())),
            ("unit_kerja", text(self.unit_kerja.as_deref())),
            ("action", text(Some(self.action.as_str()))),
            ("entity_type", text(self.entity_type.as_deref())),
            ("entity_id", text(self.entity_id.as_deref())),
            ("entity_label", text(self.entity_label.as_deref())),
            ("old_value", json(self.old_value.as_ref())),
            ("new_value", json(self.new_value.as_ref())),
            ("changed_fields", canonical_json(&Value::Array(changed))),
            ("reason", text(self.reason.as_deref())),
            ("status", text(Some(self.status.as_str()))),
            ("error_message", text(self.error_message.as_deref())),
            ("ip_address", text(self.ip_address.as_deref())),
            ("user_agent", text(self.user_agent.as_deref())),
            ("browser_name", text(self.browser_name.as_deref())),
            ("os_name", text(self.os_name.as_deref())),
            ("timestamp", text(Some(format_timestamp(&self.timestamp).as_str()))),
            ("prev_hash", text(Some(self.prev_hash.as_str()))),
        ];

        fields
            .iter()
            .map(|(key, value)| format!("{}:{}", key, value))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Calculate SHA256 hash of this entry
    pub fn calculate_hash(&self) -> String {
        let canonical = self.canonical_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    /// Verify this entry's hash
    pub fn verify_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash == GENESIS_HASH
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} {} {}:{} by {} ({})",
            self.seq,
            self.action,
            self.entity_type.as_deref().unwrap_or("-"),
            self.entity_id.as_deref().unwrap_or("-"),
            self.user_name
                .as_deref()
                .or(self.user_id.as_deref())
                .unwrap_or("anonymous"),
            self.status
        )
    }
}

/// Timestamps are chained at millisecond precision, in UTC.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON with object keys sorted at every level and no whitespace.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

fn text(value: Option<&str>) -> String {
    match value {
        Some(s) => Value::String(s.to_string()).to_string(),
        None => "null".to_string(),
    }
}

/// A payload is quoted as text so a JSON `null` payload never collides
/// with an absent one.
fn json(value: Option<&Value>) -> String {
    text(value.map(canonical_json).as_deref())
}
