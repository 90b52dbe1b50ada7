//! Configuration loading and representation.
//!
//! Read from the environment:
//!
//! - `SAGA_STORE_BACKEND`: `memory` (default) or `postgres`
//! - `DATABASE_URL`: required when the backend is `postgres`
//! - `SAGA_STORE_MAX_CONNECTIONS`: Postgres pool size (default 5)

use core::str::FromStr;

use thiserror::Error;

pub const BACKEND_VAR: &str = "SAGA_STORE_BACKEND";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "SAGA_STORE_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected 'memory' or 'postgres')")]
    UnknownBackend(String),

    #[error("{DATABASE_URL_VAR} must be set when {BACKEND_VAR}=postgres")]
    MissingDatabaseUrl,

    #[error("invalid {MAX_CONNECTIONS_VAR} '{0}': expected a positive integer")]
    InvalidMaxConnections(String),
}

/// Which backing store the saga store runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup(BACKEND_VAR) {
            Some(raw) => raw.parse()?,
            None => BackendKind::default(),
        };

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        if backend == BackendKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidMaxConnections(raw)),
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            backend,
            database_url,
            max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_in_memory() {
        assert_eq!(load(&[]).unwrap(), StoreConfig::default());
    }

    #[test]
    fn postgres_requires_database_url() {
        assert_eq!(
            load(&[(BACKEND_VAR, "postgres")]).unwrap_err(),
            ConfigError::MissingDatabaseUrl
        );

        let cfg = load(&[
            (BACKEND_VAR, "Postgres"),
            (DATABASE_URL_VAR, "postgres://localhost/sagas"),
            (MAX_CONNECTIONS_VAR, "12"),
        ])
        .unwrap();
        assert_eq!(cfg.backend, BackendKind::Postgres);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/sagas"));
        assert_eq!(cfg.max_connections, 12);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(matches!(
            load(&[(BACKEND_VAR, "redis")]),
            Err(ConfigError::UnknownBackend(b)) if b == "redis"
        ));
    }

    #[test]
    fn rejects_zero_connections() {
        assert!(matches!(
            load(&[(MAX_CONNECTIONS_VAR, "0")]),
            Err(ConfigError::InvalidMaxConnections(_))
        ));
    }
}
