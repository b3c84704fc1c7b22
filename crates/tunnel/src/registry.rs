// Per-server tunnel registry.
//
// An explicit object handed to callers instead of process-global state:
// one lazily created Tunnel per server name, reused for the registry's
// lifetime.

use std::collections::HashMap;

use habridge_common::{Config, Result, SecretsFile};

use crate::tunnel::{Tunnel, TunnelReport};

#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: HashMap<String, Tunnel>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tunnel for a server (default server when unnamed), created on
    /// first request from the secrets file and cached thereafter.
    pub fn get_or_create(
        &mut self,
        config: &Config,
        secrets: &SecretsFile,
        server: Option<&str>,
    ) -> Result<&mut Tunnel> {
        let name = secrets.resolve_name(config, server)?;
        if !self.tunnels.contains_key(&name) {
            let endpoint = secrets.tunnel(config, Some(&name))?;
            self.tunnels.insert(name.clone(), Tunnel::new(endpoint));
        }
        Ok(self.tunnels.get_mut(&name).expect("inserted above"))
    }

    /// Ensure the server's tunnel is connected, starting it if necessary.
    pub fn ensure(
        &mut self,
        config: &Config,
        secrets: &SecretsFile,
        server: Option<&str>,
    ) -> Result<bool> {
        Ok(self.get_or_create(config, secrets, server)?.ensure_connected())
    }

    /// Status report for the server's tunnel.
    pub fn status(
        &mut self,
        config: &Config,
        secrets: &SecretsFile,
        server: Option<&str>,
    ) -> Result<TunnelReport> {
        Ok(self.get_or_create(config, secrets, server)?.status())
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }
}
