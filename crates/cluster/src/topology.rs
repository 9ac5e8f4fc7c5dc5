//! Cluster topology resolution from Terraform output.
//!
//! The provisioning run emits `terraform output -json`; four of its outputs
//! describe the cluster:
//!
//! - `dns_root_record_ip`: the node the DNS root record points at. Its single
//!   key names the control plane and its value is the control-plane public IP.
//! - `server_private_ips`: every node's private network address.
//! - `server_public_ips`: nodes exposed on the public internet.
//! - `volume_node_ip`: the node carrying the storage volume.
//!
//! Map order is the order the keys appear in the document. Bastion election
//! depends on it, so the maps are [`IndexMap`]s rather than hash maps.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};

/// Inventory alias of the control-plane node.
pub const CONTROL_PLANE_ALIAS: &str = "k8s-control-plane";

/// Prefix of worker inventory aliases; workers are numbered from 1.
pub const WORKER_ALIAS_PREFIX: &str = "k8s-worker-node";

/// One Terraform output: `{"value": {node name: address}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    /// Node name to address, in document order.
    pub value: IndexMap<String, String>,
}

/// The subset of `terraform output -json` this tool understands.
///
/// Every section is optional at the parse level; [`resolve`] decides which
/// ones are required. Unknown outputs are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfraOutput {
    /// Control-plane designation.
    pub dns_root_record_ip: Option<OutputSection>,
    /// Private addresses of every node.
    pub server_private_ips: Option<OutputSection>,
    /// Public addresses of exposed nodes.
    pub server_public_ips: Option<OutputSection>,
    /// Storage-volume designation.
    pub volume_node_ip: Option<OutputSection>,
}

impl InfraOutput {
    /// Parse a Terraform output document.
    ///
    /// # Errors
    /// Returns [`ClusterError::MalformedInput`] if the text is not JSON or a
    /// known section does not map node names to address strings.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClusterError::MalformedInput(format!("Terraform output: {e}")))
    }

    /// Read and parse a Terraform output document from disk.
    ///
    /// # Errors
    /// Returns [`ClusterError::Io`] if the file cannot be read, or
    /// [`ClusterError::MalformedInput`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn section(section: Option<&OutputSection>) -> Option<&IndexMap<String, String>> {
        section.map(|s| &s.value)
    }

    /// Control-plane designation map, if present.
    #[must_use]
    pub fn root_records(&self) -> Option<&IndexMap<String, String>> {
        Self::section(self.dns_root_record_ip.as_ref())
    }

    /// Private address map, if present.
    #[must_use]
    pub fn private_ips(&self) -> Option<&IndexMap<String, String>> {
        Self::section(self.server_private_ips.as_ref())
    }

    /// Public address map, if present.
    #[must_use]
    pub fn public_ips(&self) -> Option<&IndexMap<String, String>> {
        Self::section(self.server_public_ips.as_ref())
    }

    /// Storage-volume designation map, if present.
    #[must_use]
    pub fn volume_nodes(&self) -> Option<&IndexMap<String, String>> {
        Self::section(self.volume_node_ip.as_ref())
    }

    /// Every address mentioned anywhere in the document, deduplicated.
    #[must_use]
    pub fn all_addresses(&self) -> BTreeSet<&str> {
        [
            self.root_records(),
            self.private_ips(),
            self.public_ips(),
            self.volume_nodes(),
        ]
        .into_iter()
        .flatten()
        .flat_map(IndexMap::values)
        .map(String::as_str)
        .filter(|addr| !addr.is_empty())
        .collect()
    }
}

/// Kubernetes role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The management node behind the DNS root record.
    ControlPlane,
    /// Any other node.
    Worker,
}

/// A resolved cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Terraform key; stable across runs.
    pub name: String,
    /// Inventory alias (`k8s-control-plane` or `k8s-worker-nodeN`).
    pub alias: String,
    /// Private network address.
    pub private_address: String,
    /// Public address, absent for private-only nodes.
    pub public_address: Option<String>,
    /// Kubernetes role.
    pub role: Role,
    /// Whether the storage volume is attached to this node.
    pub storage_volume: bool,
}

impl Node {
    /// Whether this node is the control plane.
    #[must_use]
    pub fn is_control_plane(&self) -> bool {
        self.role == Role::ControlPlane
    }
}

/// The public node used as an SSH relay into the private network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bastion {
    /// Terraform key of the relay node.
    pub name: String,
    /// Its public address.
    pub address: String,
}

/// Where the SOCKS tunnel should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRoute {
    /// Relay hop, if the control plane is reached through a bastion.
    pub bastion: Option<String>,
    /// Final SSH destination.
    pub target: String,
}

/// Resolved cluster topology.
///
/// Built once from an immutable [`InfraOutput`]; re-resolve to pick up drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    nodes: Vec<Node>,
    control_plane: usize,
    bastion: Option<Bastion>,
    volume_node: Option<usize>,
}

impl ClusterTopology {
    /// All nodes, sorted by name.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The control-plane node.
    #[must_use]
    pub fn control_plane(&self) -> &Node {
        &self.nodes[self.control_plane]
    }

    /// Worker nodes in alias order.
    pub fn workers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.role == Role::Worker)
    }

    /// The relay node, if one distinct from the control plane exists.
    #[must_use]
    pub fn bastion(&self) -> Option<&Bastion> {
        self.bastion.as_ref()
    }

    /// The node carrying the storage volume, if any.
    #[must_use]
    pub fn volume_node(&self) -> Option<&Node> {
        self.volume_node.map(|i| &self.nodes[i])
    }

    /// Public address of the control plane (the DNS root record).
    #[must_use]
    pub fn control_plane_public(&self) -> &str {
        self.control_plane()
            .public_address
            .as_deref()
            .unwrap_or_default()
    }

    /// Route for management traffic to the control plane.
    ///
    /// With a bastion the tunnel hops through it to the control plane's
    /// private address; without one it connects straight to the public one.
    #[must_use]
    pub fn tunnel_route(&self) -> TunnelRoute {
        match &self.bastion {
            Some(bastion) => TunnelRoute {
                bastion: Some(bastion.address.clone()),
                target: self.control_plane().private_address.clone(),
            },
            None => TunnelRoute {
                bastion: None,
                target: self.control_plane_public().to_string(),
            },
        }
    }
}

/// Elect the bastion from the public address map.
///
/// The first address, in document order, that differs from the control-plane
/// public address wins. Failing that the first entry is taken, which can only
/// be the control plane itself; that case means "no bastion" and is
/// normalised to `None` here so every caller sees the same answer.
fn elect_bastion(public_ips: &IndexMap<String, String>, cp_public: &str) -> Option<Bastion> {
    let elected = public_ips
        .iter()
        .find(|(_, ip)| ip.as_str() != cp_public)
        .or_else(|| public_ips.first())?;

    let (name, address) = elected;
    if address == cp_public {
        debug!(node = %name, "Only public address is the control plane, no bastion");
        return None;
    }

    Some(Bastion {
        name: name.clone(),
        address: address.clone(),
    })
}

/// Resolve a cluster topology from Terraform output.
///
/// # Errors
/// Returns [`ClusterError::InvalidTopology`] when the private address map is
/// missing or empty, when the control plane cannot be identified, or when the
/// volume node does not name a known node.
pub fn resolve(doc: &InfraOutput) -> Result<ClusterTopology> {
    let private_ips = doc
        .private_ips()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| {
            ClusterError::InvalidTopology("'server_private_ips' not found in Terraform output".into())
        })?;

    let unresolved = || {
        ClusterError::InvalidTopology(
            "control plane unresolved: 'dns_root_record_ip' is missing or empty".into(),
        )
    };
    let (cp_name, cp_public) = match doc.root_records() {
        Some(root) if root.len() > 1 => {
            return Err(ClusterError::InvalidTopology(format!(
                "expected exactly one DNS root record, found {}",
                root.len()
            )))
        }
        Some(root) => root.first().ok_or_else(unresolved)?,
        None => return Err(unresolved()),
    };

    if !private_ips.contains_key(cp_name) {
        return Err(ClusterError::InvalidTopology(format!(
            "control plane '{cp_name}' has no private address"
        )));
    }

    let empty = IndexMap::new();
    let public_ips = doc.public_ips().unwrap_or(&empty);
    let bastion = elect_bastion(public_ips, cp_public);

    let mut names: Vec<&String> = private_ips.keys().collect();
    names.sort();

    let mut nodes = Vec::with_capacity(names.len());
    let mut control_plane = 0;
    let mut worker_idx = 1;
    for name in names {
        let (alias, role, public_address) = if name == cp_name {
            control_plane = nodes.len();
            (
                CONTROL_PLANE_ALIAS.to_string(),
                Role::ControlPlane,
                Some(cp_public.clone()),
            )
        } else {
            let alias = format!("{WORKER_ALIAS_PREFIX}{worker_idx}");
            worker_idx += 1;
            (alias, Role::Worker, public_ips.get(name).cloned())
        };

        nodes.push(Node {
            name: name.clone(),
            alias,
            private_address: private_ips[name].clone(),
            public_address,
            role,
            storage_volume: false,
        });
    }

    let volume_node = match doc.volume_nodes().and_then(IndexMap::first) {
        Some((volume_name, _)) => {
            if doc.volume_nodes().is_some_and(|m| m.len() > 1) {
                warn!("Multiple volume nodes in Terraform output, using '{volume_name}'");
            }
            let idx = nodes
                .iter()
                .position(|n| &n.name == volume_name)
                .ok_or_else(|| {
                    ClusterError::InvalidTopology(format!(
                        "volume node '{volume_name}' has no private address"
                    ))
                })?;
            nodes[idx].storage_volume = true;
            Some(idx)
        }
        None => None,
    };

    debug!(
        control_plane = %cp_name,
        workers = nodes.len() - 1,
        bastion = ?bastion.as_ref().map(|b| &b.address),
        "Resolved cluster topology"
    );

    Ok(ClusterTopology {
        nodes,
        control_plane,
        bastion,
        volume_node,
    })
}

/// Parse and resolve a Terraform output document in one step.
///
/// # Errors
/// See [`InfraOutput::parse`] and [`resolve`].
pub fn resolve_str(json: &str) -> Result<ClusterTopology> {
    resolve(&InfraOutput::parse(json)?)
}
