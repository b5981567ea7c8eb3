//! Egress tunnel collaborator
//!
//! The fetcher queries the tunnel before direct-tier attempts and requests
//! reconnection when it has dropped; the pipeline disconnects it
//! unconditionally at run end. The trait keeps the pipeline testable
//! without a real VPN.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

/// External network-tunnel session used to change egress IP
#[async_trait]
pub trait TunnelSession: Send + Sync {
    /// Bring the tunnel up. Returns whether the session is usable.
    async fn connect(&mut self) -> bool;

    /// Whether the session currently appears connected
    async fn is_connected(&mut self) -> bool;

    /// Tear the session down; safe to call more than once
    async fn disconnect(&mut self);
}

/// OpenVPN subprocess tunnel driven from a `.ovpn` configuration file
pub struct OpenVpnTunnel {
    config_path: PathBuf,
    auth_path: Option<PathBuf>,
    process: Option<Child>,
    startup_wait: Duration,
}

impl OpenVpnTunnel {
    pub fn new(config_path: PathBuf, auth_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            auth_path,
            process: None,
            startup_wait: Duration::from_secs(10),
        }
    }

    fn process_running(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[async_trait]
impl TunnelSession for OpenVpnTunnel {
    async fn connect(&mut self) -> bool {
        if self.process_running() {
            return true;
        }
        if !self.config_path.exists() {
            error!(
                "tunnel configuration not found: {}",
                self.config_path.display()
            );
            return false;
        }

        info!("starting tunnel session");
        let mut command = Command::new("openvpn");
        command.arg("--config").arg(&self.config_path);
        if let Some(auth) = &self.auth_path {
            command.arg("--auth-user-pass").arg(auth);
        }
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        command.kill_on_drop(true);

        match command.spawn() {
            Ok(child) => {
                self.process = Some(child);
                // Give the daemon time to negotiate before first use
                tokio::time::sleep(self.startup_wait).await;
                if self.process_running() {
                    info!("tunnel session established");
                    true
                } else {
                    error!("tunnel process exited during startup");
                    self.process = None;
                    false
                }
            }
            Err(e) => {
                error!("failed to start tunnel process: {}", e);
                false
            }
        }
    }

    async fn is_connected(&mut self) -> bool {
        self.process_running()
    }

    async fn disconnect(&mut self) {
        if let Some(mut child) = self.process.take() {
            info!("disconnecting tunnel session");
            if let Err(e) = child.kill().await {
                warn!("failed to stop tunnel process: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_fails_without_config_file() {
        let mut tunnel = OpenVpnTunnel::new(PathBuf::from("/nonexistent/client.ovpn"), None);
        assert!(!tunnel.connect().await);
        assert!(!tunnel.is_connected().await);
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let mut tunnel = OpenVpnTunnel::new(PathBuf::from("/nonexistent/client.ovpn"), None);
        tunnel.disconnect().await;
        tunnel.disconnect().await;
        assert!(!tunnel.is_connected().await);
    }
}
