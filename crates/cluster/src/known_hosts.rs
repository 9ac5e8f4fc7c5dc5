//! Pruning stale cluster host keys from the operator's `known_hosts`.
//!
//! Hetzner hands out the same addresses to fresh servers across up/down
//! cycles, so old host keys trigger "REMOTE HOST IDENTIFICATION HAS CHANGED"
//! on the next run. This is hygiene only: every failure becomes a warning.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ssh;
use crate::tools::Tool;
use crate::topology::InfraOutput;

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Distinct addresses found in the document.
    pub addresses: usize,
    /// `ssh-keygen -R` calls that failed.
    pub failures: usize,
}

/// Removes cluster addresses from a known-hosts file via `ssh-keygen -R`.
#[derive(Debug, Clone)]
pub struct HostKeyReconciler {
    program: String,
    known_hosts: Option<PathBuf>,
}

impl Default for HostKeyReconciler {
    fn default() -> Self {
        Self {
            program: "ssh-keygen".to_string(),
            known_hosts: None,
        }
    }
}

impl HostKeyReconciler {
    /// Reconcile against the user's default known-hosts file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile against a specific known-hosts file.
    #[must_use]
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    /// Use a different `ssh-keygen` binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Known-hosts entries to remove for `addr`: the bare address and the
    /// bracketed form with the SSH port.
    #[must_use]
    pub fn entries_for(addr: &str) -> [String; 2] {
        [addr.to_string(), format!("[{addr}]:{}", ssh::SSH_PORT)]
    }

    /// Remove every address in the Terraform output at `document`.
    ///
    /// The raw document is read rather than a resolved topology so cleanup
    /// still works when resolution would fail.
    pub async fn reconcile(&self, document: &Path) -> ReconcileReport {
        info!("Cleaning up known_hosts for cluster IPs");
        let doc = match InfraOutput::load(document) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    path = %document.display(),
                    error = %e,
                    "Failed to clean known_hosts (expected if the cluster is already gone)"
                );
                return ReconcileReport::default();
            }
        };

        let addresses = doc.all_addresses();
        let mut report = ReconcileReport {
            addresses: addresses.len(),
            failures: 0,
        };

        for addr in addresses {
            for entry in Self::entries_for(addr) {
                if !self.remove(&entry).await {
                    report.failures += 1;
                }
            }
        }

        if report.failures > 0 {
            warn!(failures = report.failures, "Some known_hosts entries could not be removed");
        }
        debug!(?report, "known_hosts reconciled");
        report
    }

    async fn remove(&self, entry: &str) -> bool {
        let mut tool = Tool::new(&self.program).arg("-R").arg(entry);
        if let Some(file) = &self.known_hosts {
            tool = tool.arg("-f").arg(file);
        }
        tool.succeeds().await
    }
}
