use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use cluster::tunnel::DEFAULT_SOCKS_PORT;

use super::ClusterArgs;
use crate::config::DEFAULT_PLAYBOOK;
use crate::orchestrator::{Orchestrator, UpOptions};

/// Provision the cluster, install Kubernetes, and deploy the example app
#[derive(Args, Debug)]
pub struct UpCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Email for Let's Encrypt (ACME)
    #[arg(long, value_name = "EMAIL")]
    pub acme_email: String,

    /// Ansible playbook that installs Kubernetes
    #[arg(long, default_value = DEFAULT_PLAYBOOK, value_name = "FILE")]
    pub playbook: PathBuf,

    /// SSH readiness probe rounds before giving up
    #[arg(long, default_value_t = 30)]
    pub ready_attempts: u32,

    /// Seconds between SSH readiness probe rounds
    #[arg(long, default_value_t = 10)]
    pub ready_interval_secs: u64,

    /// Local SOCKS5 port for the tunnel
    #[arg(long, default_value_t = DEFAULT_SOCKS_PORT)]
    pub socks_port: u16,

    /// Apply the infrastructure plan without asking for confirmation
    #[arg(long)]
    pub auto_approve: bool,
}

impl UpCommand {
    pub fn options(&self) -> UpOptions {
        UpOptions {
            playbook: self.playbook.clone(),
            ready_attempts: self.ready_attempts,
            ready_interval: Duration::from_secs(self.ready_interval_secs),
            auto_approve: self.auto_approve,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let (layout, config) = self.cluster.resolve()?;
        let config = config
            .with_acme_email(Some(self.acme_email.clone()))
            .with_socks_port(self.socks_port);

        let mut orchestrator = Orchestrator::new(config, layout);
        orchestrator.up(&self.options()).await
    }
}
