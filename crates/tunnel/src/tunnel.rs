// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// SSH local-forward lifecycle for one server's database port.
//
// The tunnel shells out to the system ssh binary rather than speaking the
// protocol itself: that picks up ~/.ssh/config, the agent, and ProxyJump
// for free. The spawned child is owned by this Tunnel, so a stop() can be
// scoped to the process we actually started.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use habridge_common::{Error, Result, TunnelEndpoint};

use crate::probe;

/// Default seconds `start` waits for the forwarded port to open.
pub const DEFAULT_WAIT_SECS: u64 = 3;

/// Interval between liveness polls while waiting for the forward.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connect timeout handed to the ssh client itself.
const SSH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Detailed tunnel status for one server.
#[derive(Debug, Clone, Serialize)]
pub struct TunnelReport {
    pub server_name: String,
    pub tunnel_active: bool,
    pub database_responding: bool,
    pub local_port: u16,
    pub remote_target: String,
    pub ssh_endpoint: String,
}

/// One SSH local-port-forward to a server's database.
///
/// Lifecycle: inactive until `start` observes the local port open; active
/// while connects succeed; back to inactive when the child exits or is
/// killed. There is no automatic reconnection.
#[derive(Debug)]
pub struct Tunnel {
    endpoint: TunnelEndpoint,
    child: Option<Child>,
}

impl Tunnel {
    pub fn new(endpoint: TunnelEndpoint) -> Self {
        Self {
            endpoint,
            child: None,
        }
    }

    pub fn endpoint(&self) -> &TunnelEndpoint {
        &self.endpoint
    }

    pub fn server_name(&self) -> &str {
        &self.endpoint.server_name
    }

    /// True iff the forwarded local port accepts connections.
    /// Never propagates a probe failure.
    pub fn is_active(&self) -> bool {
        probe::port_open(self.endpoint.local_port)
    }

    /// True iff the service behind the forward greets like MariaDB/MySQL.
    pub fn is_database_responding(&self) -> bool {
        probe::database_greeting(self.endpoint.local_port)
    }

    /// Start the forward and block until the local port opens or the wait
    /// budget runs out. Idempotent: an already-active tunnel returns true
    /// without spawning anything.
    ///
    /// Launch failures are logged and reported as `false`, never raised.
    pub fn start(&mut self, wait_seconds: u64) -> bool {
        if self.is_active() {
            debug!(server = %self.server_name(), "tunnel already active");
            return true;
        }

        let child = match self.spawn_ssh() {
            Ok(child) => child,
            Err(err) => {
                error!(server = %self.server_name(), %err, "failed to launch ssh");
                return false;
            }
        };
        info!(
            server = %self.server_name(),
            local_port = self.endpoint.local_port,
            target = %self.endpoint.remote_target(),
            ssh = %self.endpoint.ssh_endpoint(),
            "ssh forward launched"
        );
        self.child = Some(child);

        for _ in 0..wait_seconds.saturating_mul(2) {
            thread::sleep(POLL_INTERVAL);
            if self.reap_exited_child() {
                return false;
            }
            if self.is_active() {
                return true;
            }
        }
        self.is_active()
    }

    /// Start with the default wait if not already active.
    pub fn ensure_connected(&mut self) -> bool {
        self.is_active() || self.start(DEFAULT_WAIT_SECS)
    }

    /// Tear the tunnel down, best effort. Returns whether the local port
    /// is closed afterwards; never propagates.
    ///
    /// Kills the owned child when we have one. Without one, falls back to
    /// a command-line pattern kill so tunnels left behind by earlier
    /// processes can still be stopped. The pattern matches any ssh whose
    /// arguments contain this forward's `local_port:remote_host`, which
    /// can catch a tunnel some other instance legitimately owns.
    pub fn stop(&mut self) -> bool {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        } else if self.is_active() {
            warn!(
                server = %self.server_name(),
                "stopping externally started tunnel by command-line pattern"
            );
            let pattern = format!(
                "ssh.*{}:{}",
                self.endpoint.local_port, self.endpoint.remote_host
            );
            let _ = Command::new("pkill")
                .arg("-f")
                .arg(&pattern)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        } else {
            return true;
        }

        thread::sleep(POLL_INTERVAL);
        !self.is_active()
    }

    /// Probe both layers and report. The greeting probe is skipped when
    /// the port is closed; probing a dead port would only mislead.
    pub fn status(&self) -> TunnelReport {
        let tunnel_active = self.is_active();
        let database_responding = if tunnel_active {
            self.is_database_responding()
        } else {
            false
        };
        TunnelReport {
            server_name: self.server_name().to_string(),
            tunnel_active,
            database_responding,
            local_port: self.endpoint.local_port,
            remote_target: self.endpoint.remote_target(),
            ssh_endpoint: self.endpoint.ssh_endpoint(),
        }
    }

    fn spawn_ssh(&self) -> Result<Child> {
        let forward = format!(
            "{}:{}:{}",
            self.endpoint.local_port, self.endpoint.remote_host, self.endpoint.remote_port
        );
        let destination = format!("{}@{}", self.endpoint.ssh_user, self.endpoint.ssh_host);

        let mut cmd = Command::new("ssh");
        cmd.arg("-L")
            .arg(&forward)
            .arg("-p")
            .arg(self.endpoint.ssh_port.to_string())
            // Forward only, no remote command
            .arg("-N")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "BatchMode=yes"])
            .arg("-o")
            .arg(format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"))
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(?cmd, "spawning ssh");
        cmd.spawn()
            .map_err(|err| Error::Process(format!("failed to launch ssh: {err}")))
    }

    /// If the owned child already exited, log its stderr and forget it.
    /// Returns true when the child is gone.
    fn reap_exited_child(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                error!(
                    server = %self.endpoint.server_name,
                    %status,
                    stderr = stderr.trim(),
                    "ssh exited before the forward came up"
                );
                self.child = None;
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(%err, "could not poll ssh child status");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn endpoint(local_port: u16) -> TunnelEndpoint {
        TunnelEndpoint {
            server_name: "home".to_string(),
            ssh_host: "ssh.test.invalid".to_string(),
            ssh_port: 22,
            ssh_user: "root".to_string(),
            remote_host: "core-mariadb".to_string(),
            remote_port: 3306,
            local_port,
        }
    }

    fn unused_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn inactive_when_nothing_listens() {
        let tunnel = Tunnel::new(endpoint(unused_port()));
        assert!(!tunnel.is_active());
    }

    #[test]
    fn start_is_a_no_op_when_port_already_open() {
        // A listener stands in for an established forward; start must
        // return true without spawning ssh (child stays None).
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut tunnel = Tunnel::new(endpoint(port));
        assert!(tunnel.start(1));
        assert!(tunnel.child.is_none());
    }

    #[test]
    fn status_short_circuits_greeting_probe_when_inactive() {
        let tunnel = Tunnel::new(endpoint(unused_port()));
        let report = tunnel.status();
        assert!(!report.tunnel_active);
        assert!(!report.database_responding);
        assert_eq!(report.remote_target, "core-mariadb:3306");
        assert_eq!(report.ssh_endpoint, "root@ssh.test.invalid:22");
    }

    #[test]
    fn stop_without_child_or_listener_is_a_clean_no_op() {
        let mut tunnel = Tunnel::new(endpoint(unused_port()));
        assert!(tunnel.stop());
    }

    #[test]
    fn status_report_serializes_for_json_output() {
        let tunnel = Tunnel::new(endpoint(unused_port()));
        let json = serde_json::to_value(tunnel.status()).unwrap();
        assert_eq!(json["tunnel_active"], serde_json::json!(false));
        assert!(json["local_port"].is_number());
    }
}
