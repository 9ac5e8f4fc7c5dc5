//! Ansible inventory rendering.
//!
//! Produces the INI-style grouped host file consumed by `ansible` and
//! `ansible-playbook`. Rendering is a pure function of the topology, so the
//! same topology always yields byte-identical output.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::ssh;
use crate::topology::ClusterTopology;

/// Renders a [`ClusterTopology`] as an Ansible inventory.
#[derive(Debug, Clone)]
pub struct InventoryRenderer {
    ssh_user: String,
    private_key: PathBuf,
}

impl InventoryRenderer {
    /// Create a renderer for the given private key, connecting as `root`.
    #[must_use]
    pub fn new(private_key: impl Into<PathBuf>) -> Self {
        Self {
            ssh_user: ssh::DEFAULT_SSH_USER.to_string(),
            private_key: private_key.into(),
        }
    }

    /// Override the SSH user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    /// Render the inventory text.
    #[must_use]
    pub fn render(&self, topology: &ClusterTopology) -> String {
        let mut out = String::new();

        out.push_str("[all]\n");
        for node in topology.nodes() {
            let _ = writeln!(out, "{} ansible_host={}", node.alias, node.private_address);
        }

        out.push_str("\n[kube-master]\n");
        let _ = writeln!(out, "{}", topology.control_plane().alias);

        out.push_str("\n[kube-node]\n");
        for worker in topology.workers() {
            let _ = writeln!(out, "{}", worker.alias);
        }

        out.push_str("\n[volume-node]\n");
        if let Some(volume) = topology.volume_node() {
            let _ = writeln!(out, "{}", volume.alias);
        }

        out.push_str("\n[all:vars]\n");
        let _ = writeln!(out, "ansible_user={}", self.ssh_user);
        let _ = writeln!(
            out,
            "ansible_ssh_private_key_file={}",
            self.private_key.display()
        );

        match topology.bastion() {
            Some(bastion) => {
                let relay = ssh::proxy_command(&self.ssh_user, &bastion.address, &self.private_key);
                let _ = writeln!(out, "# bastion host (Using IP: {})", bastion.address);
                if relay.contains('\'') {
                    // A quoted key path cannot sit inside a single-quoted value.
                    let _ = writeln!(out, "ansible_ssh_common_args=-o ProxyCommand=\"{relay}\"");
                } else {
                    let _ = writeln!(out, "ansible_ssh_common_args='-o ProxyCommand=\"{relay}\"'");
                }
            }
            None => out.push_str("# No suitable bastion host found\n"),
        }

        out
    }

    /// Render and write the inventory, replacing any previous file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write(&self, topology: &ClusterTopology, path: &Path) -> Result<()> {
        std::fs::write(path, self.render(topology))?;
        info!(path = %path.display(), "Inventory written");
        Ok(())
    }
}

/// Host aliases listed in the `[all]` section of an inventory.
#[must_use]
pub fn hosts(inventory: &str) -> Vec<String> {
    inventory
        .lines()
        .skip_while(|line| line.trim() != "[all]")
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with('['))
        .filter_map(|line| line.split_whitespace().next())
        .filter(|alias| !alias.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::resolve_str;

    const WITH_BASTION: &str = r#"{
        "dns_root_record_ip": {"value": {"n1": "1.2.3.4"}},
        "server_private_ips": {"value": {"n1": "10.0.0.1", "n2": "10.0.0.2", "n3": "10.0.0.3"}},
        "server_public_ips": {"value": {"n1": "1.2.3.4", "n2": "5.6.7.8"}},
        "volume_node_ip": {"value": {"n3": "10.0.0.3"}}
    }"#;

    #[test]
    fn test_render_with_bastion() {
        let topo = resolve_str(WITH_BASTION).unwrap();
        let text = InventoryRenderer::new("/keys/id").render(&topo);

        let expected_head = "\
[all]
k8s-control-plane ansible_host=10.0.0.1
k8s-worker-node1 ansible_host=10.0.0.2
k8s-worker-node2 ansible_host=10.0.0.3

[kube-master]
k8s-control-plane

[kube-node]
k8s-worker-node1
k8s-worker-node2

[volume-node]
k8s-worker-node2

[all:vars]
ansible_user=root
ansible_ssh_private_key_file=/keys/id
# bastion host (Using IP: 5.6.7.8)
";
        assert!(text.starts_with(expected_head), "got:\n{text}");
        assert!(text.contains("ansible_ssh_common_args='-o ProxyCommand=\"ssh "));
        assert!(text.contains("-W %h:%p -q root@5.6.7.8\"'"));
    }

    #[test]
    fn test_render_without_bastion_or_workers() {
        let topo = resolve_str(
            r#"{
                "dns_root_record_ip": {"value": {"cp": "1.1.1.1"}},
                "server_private_ips": {"value": {"cp": "10.0.0.1"}},
                "server_public_ips": {"value": {"cp": "1.1.1.1"}}
            }"#,
        )
        .unwrap();
        let text = InventoryRenderer::new("/keys/id").render(&topo);

        assert!(text.contains("[kube-node]\n\n[volume-node]\n\n[all:vars]\n"));
        assert!(text.ends_with("# No suitable bastion host found\n"));
        assert!(!text.contains("ansible_ssh_common_args"));
    }

    #[test]
    fn test_render_is_idempotent() {
        let topo = resolve_str(WITH_BASTION).unwrap();
        let renderer = InventoryRenderer::new("/keys/id");
        assert_eq!(renderer.render(&topo), renderer.render(&topo));
    }

    #[test]
    fn test_key_path_with_quote_drops_outer_quotes() {
        let topo = resolve_str(WITH_BASTION).unwrap();
        let text = InventoryRenderer::new("/home/o'neil/.ssh/id").render(&topo);
        assert!(text.contains(
            "ansible_ssh_common_args=-o ProxyCommand=\"ssh -o StrictHostKeyChecking=no"
        ));
        assert!(text.contains(r"-i '/home/o'\''neil/.ssh/id' -W %h:%p"));

        let text = InventoryRenderer::new("/home/Jane Doe/.ssh/id").render(&topo);
        assert!(text.contains("ansible_ssh_common_args=-o ProxyCommand="));
    }

    #[test]
    fn test_custom_user() {
        let topo = resolve_str(WITH_BASTION).unwrap();
        let text = InventoryRenderer::new("/keys/id")
            .with_user("admin")
            .render(&topo);
        assert!(text.contains("ansible_user=admin\n"));
        assert!(text.contains("-q admin@5.6.7.8"));
    }

    #[test]
    fn test_hosts_lists_all_section() {
        let topo = resolve_str(WITH_BASTION).unwrap();
        let text = InventoryRenderer::new("/keys/id").render(&topo);
        assert_eq!(
            hosts(&text),
            vec!["k8s-control-plane", "k8s-worker-node1", "k8s-worker-node2"]
        );
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.ini");
        std::fs::write(&path, "stale contents that are much longer than needed").unwrap();

        let topo = resolve_str(WITH_BASTION).unwrap();
        let renderer = InventoryRenderer::new("/keys/id");
        renderer.write(&topo, &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), renderer.render(&topo));
    }
}
