// Non-secret configuration: the map of named Home Assistant servers.
//
// Lives in config.yaml next to secrets.yaml; everything here is safe to
// commit and log. Credentials live in `crate::secrets`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Server name used when the config file does not declare a default.
pub const FALLBACK_SERVER: &str = "home";

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "HABRIDGE_CONFIG_DIR";

const CONFIG_FILE: &str = "config.yaml";

/// One `servers:` entry in config.yaml.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    /// Home Assistant hostname or IP
    pub host: String,
    /// Home Assistant API port (default: 8123)
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    8123
}

/// A server entry resolved by name, with the name and default flag attached.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub is_default: bool,
}

impl ServerConfig {
    /// Base URL of the Home Assistant API on this server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Parsed config.yaml. Immutable for the process lifetime once loaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server to use when the caller names none.
    #[serde(default)]
    pub default_server: Option<String>,
    /// Named servers, in declaration order.
    #[serde(default)]
    pub servers: IndexMap<String, ServerEntry>,
}

impl Config {
    /// Load config.yaml from the habridge configuration directory.
    pub fn load() -> Result<Self> {
        Self::load_from(config_dir().join(CONFIG_FILE))
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "config file not found: {}. Copy config.example.yaml to {} and edit it for your servers",
                path.display(),
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), servers = config.servers.len(), "config loaded");
        Ok(config)
    }

    /// The configured default server name, or the hardcoded fallback.
    pub fn default_server_name(&self) -> &str {
        self.default_server.as_deref().unwrap_or(FALLBACK_SERVER)
    }

    /// All configured server names, in declaration order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    /// Resolve a server by name, or the default when `name` is `None`.
    pub fn server(&self, name: Option<&str>) -> Result<ServerConfig> {
        let name = name.unwrap_or_else(|| self.default_server_name());
        let entry = self.servers.get(name).ok_or_else(|| {
            Error::NotFound(format!(
                "unknown server '{}'. Configured servers: {}",
                name,
                self.server_names().join(", ")
            ))
        })?;
        Ok(ServerConfig {
            name: name.to_string(),
            host: entry.host.clone(),
            port: entry.port,
            is_default: name == self.default_server_name(),
        })
    }
}

/// Directory holding config.yaml and secrets.yaml.
///
/// `HABRIDGE_CONFIG_DIR` wins when set; otherwise the platform config
/// directory (e.g. ~/.config/habridge).
pub fn config_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("habridge")
}
