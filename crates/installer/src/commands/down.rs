use anyhow::Result;
use clap::Args;
use cluster::tunnel::DEFAULT_SOCKS_PORT;

use super::ClusterArgs;
use crate::orchestrator::{DownOptions, Orchestrator};

/// Destroy in-cluster resources and the infrastructure
#[derive(Args, Debug)]
pub struct DownCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Skip Kubernetes resource destroy and go straight to infrastructure destroy
    #[arg(long)]
    pub force_infra_only: bool,

    /// Email for Let's Encrypt (ACME), passed through to the Kubernetes module
    #[arg(long, value_name = "EMAIL")]
    pub acme_email: Option<String>,

    /// Local SOCKS5 port for the tunnel
    #[arg(long, default_value_t = DEFAULT_SOCKS_PORT)]
    pub socks_port: u16,
}

impl DownCommand {
    pub async fn run(&self) -> Result<()> {
        let (layout, config) = self.cluster.resolve()?;
        let config = config
            .with_acme_email(self.acme_email.clone())
            .with_socks_port(self.socks_port);

        let mut orchestrator = Orchestrator::new(config, layout);
        orchestrator
            .down(DownOptions {
                force_infra_only: self.force_infra_only,
            })
            .await
    }
}
