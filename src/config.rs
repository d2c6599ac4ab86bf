// ⚙️ Configuration - card-collection.toml
//
// Every key is optional. Lookup order: --config path, then
// card-collection.toml, then .card-collection.toml in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_FILTER: &str = "card_collection=info";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// SQLite database file
    pub database: PathBuf,

    /// Actor name written to the audit trail
    pub actor: String,

    /// Reject creations whose catalog_ref is not in the catalog table
    pub validate_catalog: bool,

    /// tracing filter; RUST_LOG takes precedence
    pub log_filter: Option<String>,

    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: PathBuf::from("cards.db"),
            actor: "cli".to_string(),
            validate_catalog: false,
            log_filter: None,
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// First config file found in `dir`, if any
    pub fn find_and_load_in(dir: &Path) -> Result<Option<Self>> {
        for name in ["card-collection.toml", ".card-collection.toml"] {
            let location = dir.join(name);
            if location.exists() {
                return Self::load_from_file(&location).map(Some);
            }
        }

        Ok(None)
    }

    pub fn find_and_load() -> Result<Option<Self>> {
        Self::find_and_load_in(Path::new("."))
    }

    /// Explicit path, else a discovered file, else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::find_and_load()?.unwrap_or_default()),
        }
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
