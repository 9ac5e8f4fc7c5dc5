//! Hetzner cluster CLI.
//!
//! Provisions a Kubernetes cluster on Hetzner Cloud with Terraform, installs
//! Kubernetes with Ansible, and tears it all down again.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use cluster_cli::commands::down::DownCommand;
use cluster_cli::commands::up::UpCommand;
use tracing_subscriber::EnvFilter;

/// Hetzner Kubernetes cluster bring-up and teardown.
#[derive(Parser)]
#[command(
    name = "hcluster",
    version,
    about = "Hetzner Kubernetes cluster bring-up and teardown",
    long_about = "Bring a Kubernetes cluster up on Hetzner Cloud, or tear it down.\n\n\
                  `up` provisions servers with Terraform, installs Kubernetes with\n\
                  Ansible, and deploys in-cluster resources through a SOCKS5 tunnel.\n\
                  `down` removes in-cluster resources where possible and always\n\
                  destroys the infrastructure."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Bring the cluster up.
    Up(UpCommand),

    /// Tear the cluster down.
    Down(DownCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,cluster=debug,cluster_cli=debug")
    } else {
        EnvFilter::new("warn,cluster=info,cluster_cli=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Up(cmd) => cmd.run().await,
        Commands::Down(cmd) => cmd.run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED: [&str; 8] = [
        "--zone-domain",
        "example.com",
        "--token",
        "tok",
        "--ssh-public-key-path",
        "~/.ssh/id.pub",
        "--ssh-private-key-path",
        "~/.ssh/id",
    ];

    fn parse(subcommand: &str, extra: &[&str]) -> Result<Cli, clap::Error> {
        let args = ["hcluster", subcommand]
            .into_iter()
            .chain(SHARED)
            .chain(extra.iter().copied());
        Cli::try_parse_from(args)
    }

    #[test]
    fn test_up_requires_acme_email() {
        assert!(parse("up", &[]).is_err());

        let cli = parse("up", &["--acme-email", "ops@example.com", "-v"]).unwrap();
        assert!(cli.verbose);
        let Commands::Up(cmd) = cli.command else {
            panic!("expected up");
        };
        assert_eq!(cmd.acme_email, "ops@example.com");
        assert_eq!(cmd.socks_port, 1080);
        assert_eq!(cmd.options().ready_attempts, 30);
        assert_eq!(cmd.cluster.zone_domain, "example.com");
    }

    #[test]
    fn test_down_flags() {
        let cli = parse("down", &["--force-infra-only"]).unwrap();
        let Commands::Down(cmd) = cli.command else {
            panic!("expected down");
        };
        assert!(cmd.force_infra_only);
        assert!(cmd.acme_email.is_none());
    }
}
