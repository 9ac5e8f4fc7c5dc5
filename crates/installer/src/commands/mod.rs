//! CLI subcommands.

pub mod down;
pub mod up;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::{ClusterConfig, Layout};

/// Flags shared by `up` and `down`.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// DNS zone managed by Hetzner (e.g. example.com)
    #[arg(long, env = "HETZNER_ZONE_DOMAIN", value_name = "DOMAIN")]
    pub zone_domain: String,

    /// Hetzner Cloud API token
    #[arg(long, env = "HCLOUD_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub token: String,

    /// Path to the SSH public key installed on the servers
    #[arg(long, value_name = "FILE")]
    pub ssh_public_key_path: PathBuf,

    /// Path to the matching SSH private key
    #[arg(long, value_name = "FILE")]
    pub ssh_private_key_path: PathBuf,

    /// Directory holding the Terraform modules and generated artifacts
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub workdir: PathBuf,
}

impl ClusterArgs {
    /// Resolve the artifact layout and the shared configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be made absolute.
    pub fn resolve(&self) -> Result<(Layout, ClusterConfig)> {
        let layout = Layout::new(&self.workdir)?;
        let config = ClusterConfig::new(
            &self.zone_domain,
            &self.token,
            &self.ssh_public_key_path,
            &self.ssh_private_key_path,
        )?;
        Ok((layout, config))
    }
}
