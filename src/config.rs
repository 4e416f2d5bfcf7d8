use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DOCUMENT: &str = "Inventario_Ricardo";
pub const DEFAULT_CREDENTIALS_FILE: &str = "credenciales.json";
pub const DEFAULT_SECRETS_FILE: &str = ".secrets.json";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_CLIENTS: [&str; 2] = ["General", "Veggie"];
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

#[derive(Error, Debug)]
#[error("invalid value for {key}: {value}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Which iteration of the form is served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edition {
    /// Product/quantity ledger with immediate keyed upsert.
    V1,
    /// Per-client grid, secret carried as a JSON string.
    V2,
    /// Per-client grid, secret always materialized to the credentials file.
    V3,
}

impl Edition {
    pub fn is_grid(self) -> bool {
        !matches!(self, Edition::V1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Edition::V1 => "v1",
            Edition::V2 => "v2",
            Edition::V3 => "v3",
        }
    }
}

impl FromStr for Edition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "v1" | "ledger" => Ok(Edition::V1),
            "2" | "v2" | "grid" => Ok(Edition::V2),
            "3" | "v3" => Ok(Edition::V3),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Google Sheets over its REST API.
    Sheets,
    /// Process-local store, nothing survives a restart.
    Memory,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sheets" | "google" => Ok(Backend::Sheets),
            "memory" => Ok(Backend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub edition: Edition,
    pub backend: Backend,
    pub document_name: String,
    pub credentials_path: PathBuf,
    pub secrets_path: PathBuf,
    pub bind_addr: String,
    pub clients: Vec<String>,
    pub session_ttl: Duration,
    pub guard_stale_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            edition: Edition::V1,
            backend: Backend::Sheets,
            document_name: DEFAULT_DOCUMENT.to_string(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            secrets_path: PathBuf::from(DEFAULT_SECRETS_FILE),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            clients: DEFAULT_CLIENTS.iter().map(|c| c.to_string()).collect(),
            session_ttl: Duration::from_secs(SESSION_DURATION),
            guard_stale_writes: false,
        }
    }
}

impl Config {
    /// Read `ALMACEN_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("ALMACEN_EDITION") {
            config.edition = value.parse().map_err(|_| ConfigError {
                key: "ALMACEN_EDITION",
                value,
            })?;
        }
        if let Some(value) = lookup("ALMACEN_BACKEND") {
            config.backend = value.parse().map_err(|_| ConfigError {
                key: "ALMACEN_BACKEND",
                value,
            })?;
        }
        if let Some(value) = lookup("ALMACEN_DOCUMENT") {
            config.document_name = value;
        }
        if let Some(value) = lookup("ALMACEN_CREDENTIALS_FILE") {
            config.credentials_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ALMACEN_SECRETS_FILE") {
            config.secrets_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("ALMACEN_BIND") {
            config.bind_addr = value;
        }
        if let Some(value) = lookup("ALMACEN_CLIENTS") {
            config.clients = value
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("ALMACEN_SESSION_TTL_SECS") {
            let secs = value.trim().parse::<u64>().map_err(|_| ConfigError {
                key: "ALMACEN_SESSION_TTL_SECS",
                value: value.clone(),
            })?;
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("ALMACEN_GUARD_STALE_WRITES") {
            config.guard_stale_writes = match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError {
                        key: "ALMACEN_GUARD_STALE_WRITES",
                        value,
                    });
                }
            };
        }

        Ok(config)
    }
}
