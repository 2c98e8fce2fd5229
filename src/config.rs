use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::audit::logger::DEFAULT_MAX_APPEND_ATTEMPTS;
use crate::database::DatabaseOptions;
use crate::error::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_busy_timeout_ms: u64,
    pub server_host: String,
    pub server_port: u16,
    /// Bearer token for the `/audit` routes; `None` leaves them open.
    pub api_token: Option<String>,
    pub append_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://audit_ledger.db".to_string(),
            database_max_connections: 5,
            database_busy_timeout_ms: 5_000,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            api_token: None,
            append_max_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, LedgerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = AppConfig {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            database_busy_timeout_ms: parse_or(
                &lookup,
                "DATABASE_BUSY_TIMEOUT_MS",
                defaults.database_busy_timeout_ms,
            )?,
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            api_token: lookup("AUDIT_API_TOKEN").filter(|t| !t.trim().is_empty()),
            append_max_attempts: parse_or(
                &lookup,
                "AUDIT_APPEND_MAX_ATTEMPTS",
                defaults.append_max_attempts,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(LedgerError::ConfigError(format!(
                "DATABASE_URL must be a sqlite URL, got {}",
                self.database_url
            )));
        }

        if self.database_max_connections == 0 {
            return Err(LedgerError::ConfigError(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        if self.append_max_attempts == 0 {
            return Err(LedgerError::ConfigError(
                "AUDIT_APPEND_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.api_token.is_none() {
            info!("AUDIT_API_TOKEN not set; /audit routes are unauthenticated");
        }

        Ok(())
    }

    pub fn database_options(&self) -> DatabaseOptions {
        DatabaseOptions {
            max_connections: self.database_max_connections,
            busy_timeout: Duration::from_millis(self.database_busy_timeout_ms),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, LedgerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            LedgerError::ConfigError(format!("Invalid value for {}: {:?} ({})", key, raw, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite://audit_ledger.db");
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.append_max_attempts, DEFAULT_MAX_APPEND_ATTEMPTS);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite:///var/lib/blud/audit.db"),
            ("SERVER_PORT", "8088"),
            ("AUDIT_API_TOKEN", "s3cret"),
            ("DATABASE_BUSY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.server_port, 8088);
        assert_eq!(config.api_token.as_deref(), Some("s3cret"));
        assert_eq!(config.database_options().busy_timeout, Duration::from_millis(250));
        assert_eq!(config.bind_address(), "0.0.0.0:8088");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")])),
            Err(LedgerError::ConfigError(_))
        ));
        assert!(AppConfig::from_lookup(lookup_from(&[("AUDIT_APPEND_MAX_ATTEMPTS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db/audit")])).is_err());
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[("AUDIT_API_TOKEN", "  ")])).unwrap();
        assert!(config.api_token.is_none());
    }
}
