use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::SessionError;

pub const DEFAULT_HOST: &str = "127.0.0.1:27017";
pub const DEFAULT_DB: &str = "testDb";

/// Connection string for a database on the local default port.
#[must_use]
pub fn local_uri(db_name: &str) -> String {
    format!("mongodb://{DEFAULT_HOST}/{db_name}")
}

/// Session settings. Every field is optional in the file form; see [`SessionConfig::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection_string: Option<String>,
    pub db_name: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_config: Option<PathBuf>,
    /// Rolled log files kept per log file.
    pub log_retention: Option<u32>,
    pub slow_op_ms: Option<u64>,
}

impl SessionConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] on malformed TOML.
    pub fn from_toml_str(s: &str) -> Result<Self, SessionError> {
        Ok(toml::from_str::<Self>(s)?)
    }

    /// Read a TOML file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a config error if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, SessionError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    /// Build the effective config.
    /// Precedence: `overrides` > env > config files > defaults.
    ///
    /// Files are tried in order: `cli_path`, `$MONGOSESSION_CONFIG`,
    /// `~/.config/mongosession.toml`, `./mongosession.toml`. Earlier files win per field.
    ///
    /// # Errors
    /// Returns an error if `cli_path` is given but cannot be read or parsed; other
    /// candidate files that fail to parse are skipped with a warning.
    pub fn load(cli_path: Option<&Path>, overrides: Self) -> Result<Self, SessionError> {
        let mut cfg = overrides;
        cfg.merge_env(|k| std::env::var(k).ok());
        if let Some(p) = cli_path {
            cfg.fill_from(Self::from_file(p)?);
        }
        for p in candidate_paths() {
            if !p.exists() {
                continue;
            }
            match Self::from_file(&p) {
                Ok(file_cfg) => cfg.fill_from(file_cfg),
                Err(e) => log::warn!("ignoring config file {}: {e}", p.display()),
            }
        }
        Ok(cfg)
    }

    /// Fill unset fields from environment variables read through `get`.
    pub fn merge_env<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if self.connection_string.is_none() {
            self.connection_string = get("MONGOSESSION_URI");
        }
        if self.db_name.is_none() {
            self.db_name = get("MONGOSESSION_DB");
        }
        if self.log_dir.is_none() {
            self.log_dir = get("MONGOSESSION_LOG_DIR").map(PathBuf::from);
        }
        if self.log_level.is_none() {
            self.log_level = get("MONGOSESSION_LOG_LEVEL");
        }
        if self.log_config.is_none() {
            self.log_config = get("MONGOSESSION_LOG_CONFIG").map(PathBuf::from);
        }
        if self.log_retention.is_none() {
            self.log_retention = get("MONGOSESSION_LOG_RETENTION").and_then(|s| s.parse().ok());
        }
        if self.slow_op_ms.is_none() {
            self.slow_op_ms = get("MONGOSESSION_SLOW_OP_MS").and_then(|s| s.parse().ok());
        }
    }

    /// Fill unset fields from `other`.
    pub fn fill_from(&mut self, other: Self) {
        if self.connection_string.is_none() {
            self.connection_string = other.connection_string;
        }
        if self.db_name.is_none() {
            self.db_name = other.db_name;
        }
        if self.log_dir.is_none() {
            self.log_dir = other.log_dir;
        }
        if self.log_level.is_none() {
            self.log_level = other.log_level;
        }
        if self.log_config.is_none() {
            self.log_config = other.log_config;
        }
        if self.log_retention.is_none() {
            self.log_retention = other.log_retention;
        }
        if self.slow_op_ms.is_none() {
            self.slow_op_ms = other.slow_op_ms;
        }
    }

    #[must_use]
    pub fn db_name(&self) -> &str {
        self.db_name.as_deref().unwrap_or(DEFAULT_DB)
    }

    /// The configured connection string, or the local default for [`Self::db_name`].
    #[must_use]
    pub fn connection_string(&self) -> String {
        self.connection_string.clone().unwrap_or_else(|| local_uri(self.db_name()))
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(p) = std::env::var("MONGOSESSION_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join("mongosession.toml"));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("mongosession.toml"));
    }
    paths
}
