//! End-to-end: Terraform output on disk to a written inventory.

use cluster::inventory::{self, InventoryRenderer};
use cluster::topology::{resolve, InfraOutput};
use cluster::ClusterError;

const TERRAFORM_OUTPUT: &str = r#"{
  "dns_root_record_ip": {
    "sensitive": false,
    "type": ["map", "string"],
    "value": {"k8s-node-3": "95.217.10.3"}
  },
  "server_private_ips": {
    "sensitive": false,
    "type": ["map", "string"],
    "value": {
      "k8s-node-3": "10.0.1.3",
      "k8s-node-1": "10.0.1.1",
      "k8s-node-2": "10.0.1.2"
    }
  },
  "server_public_ips": {
    "sensitive": false,
    "type": ["map", "string"],
    "value": {
      "k8s-node-3": "95.217.10.3",
      "k8s-node-2": "95.217.10.2"
    }
  },
  "volume_node_ip": {
    "sensitive": false,
    "type": ["map", "string"],
    "value": {"k8s-node-1": "10.0.1.1"}
  }
}"#;

#[test]
fn terraform_output_to_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("tmpfile_terraform_output.json");
    let inventory_path = dir.path().join("tmpfile_inventory.ini");
    std::fs::write(&output, TERRAFORM_OUTPUT).unwrap();

    let topology = resolve(&InfraOutput::load(&output).unwrap()).unwrap();
    assert_eq!(topology.control_plane().name, "k8s-node-3");
    assert_eq!(topology.bastion().unwrap().address, "95.217.10.2");
    assert_eq!(topology.volume_node().unwrap().alias, "k8s-worker-node1");

    let route = topology.tunnel_route();
    assert_eq!(route.bastion.as_deref(), Some("95.217.10.2"));
    assert_eq!(route.target, "10.0.1.3");

    InventoryRenderer::new("/home/ops/.ssh/id_ed25519")
        .write(&topology, &inventory_path)
        .unwrap();
    let text = std::fs::read_to_string(&inventory_path).unwrap();

    assert!(text.starts_with(
        "[all]\n\
         k8s-worker-node1 ansible_host=10.0.1.1\n\
         k8s-worker-node2 ansible_host=10.0.1.2\n\
         k8s-control-plane ansible_host=10.0.1.3\n"
    ));
    assert!(text.contains("[kube-master]\nk8s-control-plane\n"));
    assert!(text.contains("[kube-node]\nk8s-worker-node1\nk8s-worker-node2\n"));
    assert!(text.contains("[volume-node]\nk8s-worker-node1\n"));
    assert!(text.contains("ansible_ssh_private_key_file=/home/ops/.ssh/id_ed25519\n"));
    assert_eq!(inventory::hosts(&text).len(), 3);
}

#[test]
fn partially_destroyed_output_is_rejected() {
    let doc = InfraOutput::parse(r#"{"server_public_ips": {"value": {}}}"#).unwrap();
    assert!(matches!(resolve(&doc), Err(ClusterError::InvalidTopology(_))));
    assert!(doc.all_addresses().is_empty());
}
