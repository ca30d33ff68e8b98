// Configuração via env:
//   DATABASE_URL                  — URI do MongoDB (obrigatório)
//   BOOTSTRAP_LISTENER_RETRY_SECS — espera antes de reabrir o change stream (default: 5s)

use std::env;
use std::time::Duration;

use crate::utils::error::ConfigError;

const DEFAULT_RETRY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub listener_retry_delay: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let retry_secs = match lookup("BOOTSTRAP_LISTENER_RETRY_SECS") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "BOOTSTRAP_LISTENER_RETRY_SECS",
                value,
            })?,
            None => DEFAULT_RETRY_SECS,
        };

        Ok(Self {
            database_url,
            listener_retry_delay: Duration::from_secs(retry_secs.max(1)), // Mínimo 1 segundo
        })
    }
}
