//! Service configuration from TOML, with environment overrides.
//!
//! Resolution order: defaults → file named by SURVEY_CONFIG_PATH → PORT / HOST /
//! DATABASE_PATH env variables. A missing or broken file is logged and ignored.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [database]
//! path = "survey.sqlite3"   # or ":memory:"
//! ```

use std::net::{AddrParseError, SocketAddr};

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "survey.sqlite3".into(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Apply overrides from a variable lookup (the process env in production).
    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.database.path = path;
        }
        self
    }
}

fn load_file(path: &str) -> Option<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppConfig>(&s) {
            Ok(cfg) => {
                info!(target: "survey_backend", %path, "Loaded config (TOML)");
                Some(cfg)
            }
            Err(e) => {
                error!(target: "survey_backend", %path, error = %e, "Failed to parse TOML config");
                None
            }
        },
        Err(e) => {
            error!(target: "survey_backend", %path, error = %e, "Failed to read TOML config file");
            None
        }
    }
}

pub fn load_config_from_env() -> AppConfig {
    let base = std::env::var("SURVEY_CONFIG_PATH")
        .ok()
        .and_then(|path| load_file(&path))
        .unwrap_or_default();
    base.apply_overrides(|key| std::env::var(key).ok())
}
