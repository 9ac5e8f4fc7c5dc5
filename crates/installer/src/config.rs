//! Run configuration and workspace layout.
//!
//! Every artifact lives at a fixed path under the working directory and is
//! overwritten on each run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cluster::tools::ToolEnv;
use cluster::tunnel::DEFAULT_SOCKS_PORT;

/// Terraform root module for the servers, network, and DNS.
pub const TERRAFORM_INFRA_DIR: &str = "terraform";
/// Terraform root module for in-cluster resources.
pub const TERRAFORM_K8S_DIR: &str = "terraform-kubernetes";
/// Cached `terraform output -json`.
pub const OUTPUT_JSON_FILE: &str = "tmpfile_terraform_output.json";
/// Generated Ansible inventory.
pub const INVENTORY_FILE: &str = "tmpfile_inventory.ini";
/// Downloaded (and patched) admin kubeconfig.
pub const KUBECONFIG_FILE: &str = "tmpfile_kube_config";
/// Rendered example application manifest.
pub const APP_MANIFEST_FILE: &str = "tmpfile_nginx-app-http-redirect.yaml";
/// Human-readable run summary.
pub const SUMMARY_FILE: &str = "tmpfile_cluster_summary.txt";
/// Default playbook that installs Kubernetes.
pub const DEFAULT_PLAYBOOK: &str = "ansible/cluster.yml";
/// Kubeconfig location on the control plane.
pub const REMOTE_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";

/// Expand a leading `~` and make `path` absolute against the current directory.
///
/// # Errors
/// Returns an error if the home or current directory cannot be determined.
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(rest),
        Err(_) => path.to_path_buf(),
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()
            .context("Could not determine current directory")?
            .join(expanded))
    }
}

/// Fixed artifact paths relative to the invocation directory.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root` (made absolute).
    ///
    /// # Errors
    /// Returns an error if `root` cannot be made absolute.
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: expand_path(root)?,
        })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn terraform_infra_dir(&self) -> PathBuf {
        self.root.join(TERRAFORM_INFRA_DIR)
    }

    #[must_use]
    pub fn terraform_k8s_dir(&self) -> PathBuf {
        self.root.join(TERRAFORM_K8S_DIR)
    }

    #[must_use]
    pub fn output_json(&self) -> PathBuf {
        self.root.join(OUTPUT_JSON_FILE)
    }

    #[must_use]
    pub fn inventory(&self) -> PathBuf {
        self.root.join(INVENTORY_FILE)
    }

    #[must_use]
    pub fn kubeconfig(&self) -> PathBuf {
        self.root.join(KUBECONFIG_FILE)
    }

    #[must_use]
    pub fn app_manifest(&self) -> PathBuf {
        self.root.join(APP_MANIFEST_FILE)
    }

    #[must_use]
    pub fn summary(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    /// Resolve a path given on the command line against the root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Settings shared by bring-up and teardown.
#[derive(Clone)]
pub struct ClusterConfig {
    /// DNS zone managed by Hetzner (e.g. `example.com`).
    pub zone_domain: String,
    /// Hetzner Cloud API token.
    pub hcloud_token: String,
    /// SSH public key installed on the servers.
    pub ssh_public_key: PathBuf,
    /// Matching private key, absolute.
    pub ssh_private_key: PathBuf,
    /// Contact email for Let's Encrypt.
    pub acme_email: Option<String>,
    /// Local SOCKS port for the tunnel.
    pub socks_port: u16,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("zone_domain", &self.zone_domain)
            .field("hcloud_token", &"<redacted>")
            .field("ssh_public_key", &self.ssh_public_key)
            .field("ssh_private_key", &self.ssh_private_key)
            .field("acme_email", &self.acme_email)
            .field("socks_port", &self.socks_port)
            .finish()
    }
}

impl ClusterConfig {
    /// Build a config, expanding both key paths.
    ///
    /// # Errors
    /// Returns an error if a key path cannot be expanded.
    pub fn new(
        zone_domain: impl Into<String>,
        hcloud_token: impl Into<String>,
        ssh_public_key: &Path,
        ssh_private_key: &Path,
    ) -> Result<Self> {
        Ok(Self {
            zone_domain: zone_domain.into(),
            hcloud_token: hcloud_token.into(),
            ssh_public_key: expand_path(ssh_public_key)?,
            ssh_private_key: expand_path(ssh_private_key)?,
            acme_email: None,
            socks_port: DEFAULT_SOCKS_PORT,
        })
    }

    /// Set the ACME contact email.
    #[must_use]
    pub fn with_acme_email(mut self, email: Option<String>) -> Self {
        self.acme_email = email;
        self
    }

    /// Set the SOCKS port.
    #[must_use]
    pub fn with_socks_port(mut self, port: u16) -> Self {
        self.socks_port = port;
        self
    }

    /// Variables for the infrastructure Terraform module.
    #[must_use]
    pub fn terraform_env(&self) -> ToolEnv {
        vec![
            ("TF_VAR_hcloud_token".into(), self.hcloud_token.clone()),
            ("TF_VAR_hetzner_zone_domain".into(), self.zone_domain.clone()),
            (
                "TF_VAR_ssh_public_key_path".into(),
                self.ssh_public_key.display().to_string(),
            ),
        ]
    }

    /// Variables for the Kubernetes Terraform module and `kubectl`.
    ///
    /// MetalLB hands out the control plane's public address as the single
    /// load-balancer IP.
    #[must_use]
    pub fn apps_env(&self, control_plane_public: &str, kubeconfig: &Path) -> ToolEnv {
        let kubeconfig = kubeconfig.display().to_string();
        let mut env = self.terraform_env();
        env.push(("TF_VAR_metallb_ip".into(), format!("{control_plane_public}/32")));
        if let Some(email) = &self.acme_email {
            env.push(("TF_VAR_acme_email".into(), email.clone()));
        }
        env.push(("TF_VAR_kube_config_path".into(), kubeconfig.clone()));
        env.push(("KUBECONFIG".into(), kubeconfig));
        env
    }
}
