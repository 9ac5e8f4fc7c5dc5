//! Background SOCKS tunnel into the cluster's private network.
//!
//! A single `ssh -D` process provides a local SOCKS5 listener that routes
//! `kubectl` and Terraform traffic to the control plane, hopping through the
//! bastion when there is one. The process is owned by [`TunnelManager`] and
//! is terminated on every exit path: explicit [`TunnelManager::stop`], the end
//! of [`TunnelManager::scoped`], or drop.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};
use crate::ssh;
use crate::topology::TunnelRoute;

/// Local SOCKS listener port.
pub const DEFAULT_SOCKS_PORT: u16 = 1080;

/// How long the tunnel gets to fail before it is considered established.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// SOCKS proxy URL for a local port, as written into kubeconfig.
#[must_use]
pub fn proxy_url(port: u16) -> String {
    format!("socks5://localhost:{port}")
}

/// Tunnel process configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Program to launch (normally `ssh`).
    pub program: String,
    /// Arguments placed before the generated SSH arguments.
    pub launcher_args: Vec<String>,
    /// Remote SSH user.
    pub user: String,
    /// Private key used for both hops.
    pub identity: PathBuf,
    /// Local SOCKS port.
    pub socks_port: u16,
    /// Wait after spawning before checking the process is still up.
    pub grace_period: Duration,
}

impl TunnelConfig {
    /// Default `ssh` tunnel configuration for `identity`.
    #[must_use]
    pub fn new(identity: impl Into<PathBuf>) -> Self {
        Self {
            program: "ssh".to_string(),
            launcher_args: Vec::new(),
            user: ssh::DEFAULT_SSH_USER.to_string(),
            identity: identity.into(),
            socks_port: DEFAULT_SOCKS_PORT,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Set the local SOCKS port.
    #[must_use]
    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = port;
        self
    }

    /// Set the startup grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Replace the launched program.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>, launcher_args: Vec<String>) -> Self {
        self.program = program.into();
        self.launcher_args = launcher_args;
        self
    }
}

/// Lifecycle of a tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Spawned, still inside the grace period.
    Starting,
    /// Survived the grace period.
    Live,
    /// Terminated or found dead; the handle is released.
    Terminated,
}

/// A running tunnel process.
#[derive(Debug)]
pub struct TunnelSession {
    child: Option<Child>,
    target: String,
    via_bastion: bool,
    state: TunnelState,
}

impl TunnelSession {
    /// Final SSH destination.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the session relays through a bastion.
    #[must_use]
    pub fn via_bastion(&self) -> bool {
        self.via_bastion
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// Whether the process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Terminate the process if it is still running.
    ///
    /// Safe to call repeatedly and on a process that already exited.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                info!(target = %self.target, "Shutting down SOCKS5 tunnel");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to signal tunnel process");
                }
            }
        }
        self.state = TunnelState::Terminated;
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns at most one live [`TunnelSession`].
#[derive(Debug)]
pub struct TunnelManager {
    config: TunnelConfig,
    active: Option<TunnelSession>,
}

impl TunnelManager {
    /// Create a manager; no process is started until [`Self::start`].
    #[must_use]
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// The tunnel configuration.
    #[must_use]
    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// SOCKS proxy URL clients should use.
    #[must_use]
    pub fn proxy_url(&self) -> String {
        proxy_url(self.config.socks_port)
    }

    /// SSH arguments for `route`.
    ///
    /// Every session forwards a local dynamic port, runs no remote command,
    /// and skips host-key verification. A bastion becomes an inner relay
    /// wrapped as the outer session's `ProxyCommand`, so the relaxed options
    /// apply to both hops.
    #[must_use]
    pub fn ssh_args(&self, route: &TunnelRoute) -> Vec<String> {
        let mut args = self.config.launcher_args.clone();
        args.extend(ssh::relaxed_option_args());
        args.extend([
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-D".to_string(),
            self.config.socks_port.to_string(),
            "-q".to_string(),
            "-N".to_string(),
        ]);
        if let Some(bastion) = &route.bastion {
            args.push("-o".to_string());
            args.push(format!(
                "ProxyCommand={}",
                ssh::proxy_command(&self.config.user, bastion, &self.config.identity)
            ));
        }
        args.push("-i".to_string());
        args.push(self.config.identity.display().to_string());
        args.push(ssh::destination(&self.config.user, &route.target));
        args
    }

    /// Start the tunnel for `route`.
    ///
    /// Any previous session is stopped first. After the grace period the
    /// process must still be running.
    ///
    /// # Errors
    /// Returns [`ClusterError::TunnelStartFailed`] if the process cannot be
    /// spawned or exits during the grace period; no session is kept.
    pub async fn start(&mut self, route: &TunnelRoute) -> Result<&TunnelSession> {
        self.stop();

        info!(
            target = %route.target,
            bastion = ?route.bastion,
            port = self.config.socks_port,
            "Establishing SOCKS5 tunnel"
        );

        let args = self.ssh_args(route);
        debug!(program = %self.config.program, ?args, "Spawning tunnel process");

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClusterError::TunnelStartFailed {
                target: route.target.clone(),
                status: Some(e.to_string()),
            })?;

        let mut session = TunnelSession {
            child: Some(child),
            target: route.target.clone(),
            via_bastion: route.bastion.is_some(),
            state: TunnelState::Starting,
        };

        tokio::time::sleep(self.config.grace_period).await;

        let exited = match session.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => None,
            Some(Ok(Some(status))) => Some(status.to_string()),
            Some(Err(e)) => Some(e.to_string()),
            None => Some("process handle lost".to_string()),
        };
        if let Some(status) = exited {
            session.stop();
            return Err(ClusterError::TunnelStartFailed {
                target: route.target.clone(),
                status: Some(status),
            });
        }

        session.state = TunnelState::Live;
        info!(port = self.config.socks_port, "SOCKS5 tunnel established");
        Ok(&*self.active.insert(session))
    }

    /// Whether a session exists and its process is running.
    pub fn is_live(&mut self) -> bool {
        self.active.as_mut().is_some_and(TunnelSession::is_alive)
    }

    /// The active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&TunnelSession> {
        self.active.as_ref()
    }

    /// Terminate the active session, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.active.take() {
            session.stop();
        }
    }

    /// Run `f` with the tunnel up, stopping it afterwards whatever `f` returns.
    ///
    /// If `f` panics the session is still terminated when the manager is
    /// dropped during unwinding.
    ///
    /// # Errors
    /// Returns the tunnel start error, or whatever `f` returns.
    pub async fn scoped<T, E, F, Fut>(&mut self, route: &TunnelRoute, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<ClusterError>,
    {
        self.start(route).await?;
        let result = f().await;
        self.stop();
        result
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(bastion: Option<&str>, target: &str) -> TunnelRoute {
        TunnelRoute {
            bastion: bastion.map(str::to_string),
            target: target.to_string(),
        }
    }

    #[cfg(unix)]
    fn fake_tunnel(script: &str) -> TunnelManager {
        TunnelManager::new(
            TunnelConfig::new("/keys/id")
                .with_program("sh", vec!["-c".into(), script.into(), "ssh".into()])
                .with_grace_period(Duration::from_millis(200)),
        )
    }

    #[test]
    fn test_direct_ssh_args() {
        let manager = TunnelManager::new(TunnelConfig::new("/keys/id"));
        let args = manager.ssh_args(&route(None, "1.2.3.4"));

        assert!(args.windows(2).any(|w| w == ["-D", "1080"]));
        assert!(args.contains(&"-N".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("ProxyCommand=")));
        assert_eq!(args[args.len() - 2..], ["/keys/id", "root@1.2.3.4"]);
    }

    #[test]
    fn test_relayed_ssh_args() {
        let manager = TunnelManager::new(TunnelConfig::new("/keys/id").with_socks_port(1081));
        let args = manager.ssh_args(&route(Some("5.6.7.8"), "10.0.0.1"));

        let proxy = args
            .iter()
            .find(|a| a.starts_with("ProxyCommand="))
            .expect("relay directive");
        assert!(proxy.contains("StrictHostKeyChecking=no"));
        assert!(proxy.ends_with("-W %h:%p -q root@5.6.7.8"));
        assert!(args.windows(2).any(|w| w == ["-D", "1081"]));
        assert_eq!(args.last().map(String::as_str), Some("root@10.0.0.1"));
        assert_eq!(manager.proxy_url(), "socks5://localhost:1081");
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let mut manager = TunnelManager::new(TunnelConfig::new("/keys/id"));
        manager.stop();
        manager.stop();
        assert!(!manager.is_live());
        assert!(manager.session().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_and_stop_live_tunnel() {
        let mut manager = fake_tunnel("sleep 30");
        let session = manager.start(&route(Some("5.6.7.8"), "10.0.0.1")).await.unwrap();
        assert_eq!(session.state(), TunnelState::Live);
        assert!(session.via_bastion());
        assert_eq!(session.target(), "10.0.0.1");
        assert!(manager.is_live());

        manager.stop();
        assert!(!manager.is_live());
        manager.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exiting_during_grace_fails() {
        let mut manager = fake_tunnel("exit 255");
        let err = manager.start(&route(None, "1.2.3.4")).await.unwrap_err();
        assert!(matches!(err, ClusterError::TunnelStartFailed { .. }));
        assert!(manager.session().is_none());
        manager.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_stop_after_exit_is_noop() {
        let mut manager = fake_tunnel("sleep 0.5");
        manager.start(&route(None, "1.2.3.4")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!manager.is_live());
        manager.stop();
        manager.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_stop_terminates_running_process() {
        let child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut session = TunnelSession {
            child: Some(child),
            target: "1.2.3.4".to_string(),
            via_bastion: false,
            state: TunnelState::Live,
        };
        assert!(session.is_alive());

        session.stop();
        assert_eq!(session.state(), TunnelState::Terminated);
        assert!(!session.is_alive());
        session.stop();
        assert_eq!(session.state(), TunnelState::Terminated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scoped_stops_on_error() {
        let mut manager = fake_tunnel("sleep 30");
        let result: std::result::Result<(), ClusterError> = manager
            .scoped(&route(None, "1.2.3.4"), || async {
                Err(ClusterError::tool("terraform", "exit status: 1"))
            })
            .await;
        assert!(result.is_err());
        assert!(manager.session().is_none());
        assert!(!manager.is_live());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scoped_returns_value() {
        let mut manager = fake_tunnel("sleep 30");
        let value: std::result::Result<u8, ClusterError> = manager
            .scoped(&route(None, "1.2.3.4"), || async { Ok(7) })
            .await;
        assert_eq!(value.unwrap(), 7);
        assert!(manager.session().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_replaces_previous_session() {
        let mut manager = fake_tunnel("sleep 30");
        manager.start(&route(None, "1.2.3.4")).await.unwrap();
        manager.start(&route(None, "4.3.2.1")).await.unwrap();
        assert_eq!(manager.session().map(TunnelSession::target), Some("4.3.2.1"));
        manager.stop();
    }
}
