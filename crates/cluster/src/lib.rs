//! Hetzner Kubernetes cluster plumbing.
//!
//! This crate turns the output of the Terraform provisioning run into a
//! cluster topology and provides everything needed to reach nodes on the
//! private network:
//!
//! - [`topology`]: control plane, workers, bastion, and storage volume from
//!   `terraform output -json`
//! - [`inventory`]: Ansible inventory rendering
//! - [`known_hosts`]: stale host-key cleanup
//! - [`tunnel`]: the background SOCKS tunnel and its guaranteed teardown
//! - [`readiness`]: waiting for nodes to accept SSH
//! - [`kubeconfig`]: routing the admin kubeconfig through the tunnel
//!
//! # Example
//!
//! ```rust,ignore
//! use cluster::inventory::InventoryRenderer;
//! use cluster::topology::{resolve, InfraOutput};
//! use cluster::tunnel::{TunnelConfig, TunnelManager};
//!
//! let doc = InfraOutput::load("tmpfile_terraform_output.json".as_ref())?;
//! let topology = resolve(&doc)?;
//! InventoryRenderer::new("/home/me/.ssh/id_ed25519")
//!     .write(&topology, "tmpfile_inventory.ini".as_ref())?;
//!
//! let mut tunnel = TunnelManager::new(TunnelConfig::new("/home/me/.ssh/id_ed25519"));
//! tunnel
//!     .scoped(&topology.tunnel_route(), || async {
//!         // kubectl / terraform calls through socks5://localhost:1080
//!         Ok::<_, cluster::ClusterError>(())
//!     })
//!     .await?;
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod inventory;
pub mod known_hosts;
pub mod kubeconfig;
pub mod manifests;
pub mod readiness;
pub mod ssh;
pub mod tools;
pub mod topology;
pub mod tunnel;

pub use error::{ClusterError, Result};
pub use inventory::InventoryRenderer;
pub use known_hosts::HostKeyReconciler;
pub use readiness::{AnsiblePing, ConnectivityProbe, ReadinessPoller};
pub use topology::{resolve, ClusterTopology, InfraOutput, Node, Role};
pub use tunnel::{TunnelConfig, TunnelManager, TunnelSession, TunnelState};
