// ⚙️ Configuration
//
// Defaults, then an optional JSON file, then environment overrides.

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scoring::EligibilityPolicy;

/// Names the JSON config file for the binaries
pub const CONFIG_ENV: &str = "PAROLE_CONFIG";
pub const DB_PATH_ENV: &str = "PAROLE_DB_PATH";
pub const BIND_ADDR_ENV: &str = "PAROLE_BIND_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Address the REST server listens on
    pub bind_address: String,

    /// Parole eligibility thresholds
    pub policy: EligibilityPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("parole.db"),
            bind_address: "127.0.0.1:3000".to_string(),
            policy: EligibilityPolicy::default(),
        }
    }
}

impl Config {
    /// Load config from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Defaults, then `path` (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load using `PAROLE_CONFIG` to locate the file
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Config::load(path.as_deref())
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(db_path);
        }
        if let Some(bind) = lookup(BIND_ADDR_ENV).filter(|v| !v.is_empty()) {
            self.bind_address = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_address.trim().is_empty() {
            bail!("bind_address must not be empty");
        }
        if let Err(msg) = self.policy.validate() {
            bail!("invalid eligibility policy: {}", msg);
        }
        Ok(())
    }
}
