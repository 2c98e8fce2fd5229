use thiserror::Error;

/// Marker raised by the `audit_log` triggers on UPDATE/DELETE.
pub const APPEND_ONLY_MARKER: &str = "audit_log is append-only";

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.message().contains(APPEND_ONLY_MARKER) {
                return Self::ImmutabilityViolation(db_err.message().to_string());
            }
        }
        Self::StorageUnavailable(format!("Database error: {}", err))
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::StorageUnavailable(format!("Migration error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Chain violation at seq {seq}: {reason}")]
    ChainViolation { seq: i64, reason: String },

    #[error("Immutability violation: {0}")]
    ImmutabilityViolation(String),

    #[error("Concurrent append could not be serialized after {0} attempts")]
    ConcurrentAppend(u32),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LedgerError {
    pub fn unknown_action(value: &str) -> Self {
        Self::ValidationError(format!("Unrecognized audit action: {}", value))
    }

    pub fn unknown_status(value: &str) -> Self {
        Self::ValidationError(format!(
            "Unrecognized audit status: {}. Must be SUCCESS or FAILURE",
            value
        ))
    }

    pub fn invalid_range(from_seq: i64, to_seq: i64) -> Self {
        Self::ValidationError(format!(
            "Invalid sequence range: from {} is greater than to {}",
            from_seq, to_seq
        ))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
