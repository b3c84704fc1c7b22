// Per-server credentials: API tokens, database logins, SSH tunnel endpoints.
//
// Loaded from secrets.yaml, which is access-restricted and gitignored.
// Secret values are wrapped in `SecretString` so they are redacted from
// Debug output and zeroed on drop; nothing in this module logs them.

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Config;
use crate::error::{Error, Result};

const SECRETS_FILE: &str = "secrets.yaml";

/// A secret value with a redacted Debug representation, zeroed on drop.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying secret. Callers must not log the returned value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

/// Resolved API endpoint credentials for one server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: String,
    pub token: SecretString,
}

/// `database:` section of a secrets entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSecrets {
    pub user: String,
    pub password: SecretString,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub database: String,
}

/// `ssh_tunnel:` section of a secrets entry, as written in the file.
///
/// `host` is the only required field; everything else carries the defaults
/// of a Home Assistant OS installation with the MariaDB add-on.
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelSecrets {
    /// SSH server to tunnel through. Required.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_ssh_user")]
    pub user: String,
    /// Host the database listens on, as seen from the SSH server.
    #[serde(default = "default_remote_host")]
    pub remote_host: String,
    #[serde(default = "default_db_port")]
    pub remote_port: u16,
    /// Local port the forward binds on 127.0.0.1.
    #[serde(default = "default_db_port")]
    pub local_port: u16,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_remote_host() -> String {
    "core-mariadb".to_string()
}

/// A fully resolved and validated tunnel target for one server.
#[derive(Debug, Clone)]
pub struct TunnelEndpoint {
    pub server_name: String,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub remote_host: String,
    pub remote_port: u16,
    pub local_port: u16,
}

impl TunnelEndpoint {
    /// `user@host:port` form used in status output and log lines.
    pub fn ssh_endpoint(&self) -> String {
        format!("{}@{}:{}", self.ssh_user, self.ssh_host, self.ssh_port)
    }

    /// `host:port` the forward ultimately points at.
    pub fn remote_target(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}

/// One `servers:` entry in secrets.yaml.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSecrets {
    /// Long-lived Home Assistant access token.
    #[serde(default)]
    pub token: Option<SecretString>,
    #[serde(default)]
    pub database: Option<DatabaseSecrets>,
    #[serde(default)]
    pub ssh_tunnel: Option<TunnelSecrets>,
}

/// Parsed secrets.yaml, keyed by server name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretsFile {
    #[serde(default)]
    pub servers: IndexMap<String, ServerSecrets>,
}

impl SecretsFile {
    /// Load secrets.yaml from the habridge configuration directory.
    pub fn load() -> Result<Self> {
        Self::load_from(crate::config::config_dir().join(SECRETS_FILE))
    }

    /// Load secrets from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "secrets file not found: {}. Copy secrets.example.yaml to {} and add your credentials",
                path.display(),
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        let secrets: Self = serde_yaml::from_str(&contents)?;
        // Log the path only; secret values must never reach the log.
        tracing::debug!(path = %path.display(), entries = secrets.servers.len(), "secrets loaded");
        Ok(secrets)
    }

    /// The secrets entry for a server, by exact name.
    pub fn server(&self, name: &str) -> Result<&ServerSecrets> {
        self.servers.get(name).ok_or_else(|| {
            Error::NotFound(format!(
                "no secrets entry for server '{name}'. Add servers.{name} to secrets.yaml"
            ))
        })
    }

    /// API URL and token for a server (default server when unnamed).
    ///
    /// The URL comes from the non-secret config, the token from here.
    pub fn credentials(&self, config: &Config, name: Option<&str>) -> Result<Credentials> {
        let server = config.server(name)?;
        let entry = self.server(&server.name)?;
        let token = entry.token.clone().ok_or_else(|| {
            Error::MissingCredential(format!(
                "no API token for server '{}'. Set servers.{}.token in secrets.yaml",
                server.name, server.name
            ))
        })?;
        Ok(Credentials {
            url: server.base_url(),
            token,
        })
    }

    /// Database login for a server (default server when unnamed).
    pub fn database(&self, config: &Config, name: Option<&str>) -> Result<&DatabaseSecrets> {
        let server = config.server(name)?;
        let entry = self.server(&server.name)?;
        entry.database.as_ref().ok_or_else(|| {
            Error::NotFound(format!(
                "no database secrets for server '{}'. Add servers.{}.database to secrets.yaml",
                server.name, server.name
            ))
        })
    }

    /// Validated SSH tunnel endpoint for a server (default when unnamed).
    pub fn tunnel(&self, config: &Config, name: Option<&str>) -> Result<TunnelEndpoint> {
        let server = config.server(name)?;
        let entry = self.server(&server.name)?;
        let tunnel = entry.ssh_tunnel.as_ref().ok_or_else(|| {
            Error::NotFound(format!(
                "no SSH tunnel secrets for server '{}'. Add servers.{}.ssh_tunnel to secrets.yaml",
                server.name, server.name
            ))
        })?;
        let ssh_host = tunnel.host.clone().ok_or_else(|| {
            Error::Misconfigured(format!(
                "SSH tunnel host not configured for server '{}'. Set servers.{}.ssh_tunnel.host in secrets.yaml",
                server.name, server.name
            ))
        })?;
        Ok(TunnelEndpoint {
            server_name: server.name,
            ssh_host,
            ssh_port: tunnel.port,
            ssh_user: tunnel.user.clone(),
            remote_host: tunnel.remote_host.clone(),
            remote_port: tunnel.remote_port,
            local_port: tunnel.local_port,
        })
    }

    /// Resolve the server name a caller asked for (default when unnamed),
    /// checking it exists in the config.
    pub fn resolve_name(&self, config: &Config, name: Option<&str>) -> Result<String> {
        Ok(config.server(name)?.name)
    }
}
