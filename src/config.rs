use std::{env, path::PathBuf, process};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::{auth::to_hex, error::ConfigError};

pub const HOST_VAR: &str = "SPLITLEDGER_HOST";
pub const PORT_VAR: &str = "SPLITLEDGER_PORT";
pub const DB_PATH_VAR: &str = "SPLITLEDGER_DB_PATH";
pub const TOKEN_SECRET_VAR: &str = "SPLITLEDGER_TOKEN_SECRET";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7777;
const DEFAULT_DB_PATH: &str = "db";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Holds one subdirectory per entity kind.
    pub db_path: PathBuf,
    pub token_secret: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ClientConfig { host, port } = ClientConfig::from_lookup(&lookup)?;
        let db_path = lookup(DB_PATH_VAR)
            .map(|path| non_blank(DB_PATH_VAR, path))
            .transpose()?
            .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from);
        let token_secret = match lookup(TOKEN_SECRET_VAR) {
            Some(secret) => non_blank(TOKEN_SECRET_VAR, secret)?,
            None => ephemeral_secret(),
        };

        Ok(Self {
            host,
            port,
            db_path,
            token_secret,
        })
    }

    pub fn users_dir(&self) -> PathBuf {
        self.db_path.join("users")
    }

    pub fn groups_dir(&self) -> PathBuf {
        self.db_path.join("groups")
    }

    pub fn payments_dir(&self) -> PathBuf {
        self.db_path.join("payments")
    }
}

/// Where the console client connects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = match lookup(HOST_VAR) {
            Some(host) => non_blank(HOST_VAR, host)?,
            None => DEFAULT_HOST.to_owned(),
        };
        let port = match lookup(PORT_VAR) {
            Some(value) => match value.trim().parse() {
                Ok(port) => port,
                Err(_) => {
                    return Err(ConfigError::InvalidPort {
                        var: PORT_VAR,
                        value,
                    })
                }
            },
            None => DEFAULT_PORT,
        };
        Ok(Self { host, port })
    }
}

fn non_blank(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Blank { var });
    }
    Ok(value)
}

// Tokens minted with this secret do not survive a restart, which matches
// sessions living only in memory.
fn ephemeral_secret() -> String {
    let seed = format!(
        "{}:{}",
        process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    to_hex(&Sha256::digest(seed.as_bytes()))
}
