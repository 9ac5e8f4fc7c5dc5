//! Human-readable summary written after a successful bring-up.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cluster::ClusterTopology;

use crate::config::Layout;
use crate::ui;

/// Snapshot of a finished bring-up.
#[derive(Debug, Clone)]
pub struct RunSummary<'a> {
    topology: &'a ClusterTopology,
    layout: &'a Layout,
    finished_at: DateTime<Utc>,
}

impl<'a> RunSummary<'a> {
    pub fn new(topology: &'a ClusterTopology, layout: &'a Layout) -> Self {
        Self {
            topology,
            layout,
            finished_at: Utc::now(),
        }
    }

    /// Render the summary text.
    pub fn render(&self) -> String {
        let cp = self.topology.control_plane();
        let mut out = String::new();

        let _ = writeln!(out, "Cluster summary ({})", self.finished_at.to_rfc3339());
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Control plane: {} (public {}, private {})",
            cp.name,
            self.topology.control_plane_public(),
            cp.private_address
        );
        match self.topology.bastion() {
            Some(bastion) => {
                let _ = writeln!(out, "Bastion: {} ({})", bastion.name, bastion.address);
            }
            None => {
                let _ = writeln!(out, "Bastion: none");
            }
        }

        let _ = writeln!(out, "Workers:");
        let mut any_worker = false;
        for worker in self.topology.workers() {
            any_worker = true;
            let _ = writeln!(
                out,
                "  {} = {} ({})",
                worker.alias, worker.name, worker.private_address
            );
        }
        if !any_worker {
            let _ = writeln!(out, "  none");
        }

        let volume = self
            .topology
            .volume_node()
            .map_or_else(|| "none".to_string(), |n| n.alias.clone());
        let _ = writeln!(out, "Storage volume: {volume}");

        let _ = writeln!(out);
        let _ = writeln!(out, "Artifacts:");
        for (label, path) in [
            ("Terraform output", self.layout.output_json()),
            ("Inventory", self.layout.inventory()),
            ("Kubeconfig", self.layout.kubeconfig()),
            ("App manifest", self.layout.app_manifest()),
        ] {
            let _ = writeln!(out, "  {label}: {}", path.display());
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Use the cluster (SOCKS tunnel required):");
        let _ = writeln!(
            out,
            "  KUBECONFIG={} kubectl get nodes",
            self.layout.kubeconfig().display()
        );
        out
    }

    /// Write the summary to `path`, replacing any previous run's summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("Failed to write summary to {}", path.display()))
    }

    /// Print the headline facts to the console.
    pub fn print(&self) {
        let cp = self.topology.control_plane();
        ui::print_detail("Control plane", &format!("{} ({})", cp.name, self.topology.control_plane_public()));
        ui::print_detail(
            "Bastion",
            self.topology.bastion().map_or("none", |b| b.address.as_str()),
        );
        ui::print_detail("Workers", &self.topology.workers().count().to_string());
        ui::print_detail("Kubeconfig", &self.layout.kubeconfig().display().to_string());
        ui::print_detail("Summary", &self.layout.summary().display().to_string());
    }
}
