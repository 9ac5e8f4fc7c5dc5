//! Cluster workflow orchestration.
//!
//! Runs the bring-up and teardown phases in order, coordinating:
//! - Terraform for servers, network, DNS, and in-cluster resources
//! - Ansible for Kubernetes installation
//! - The SOCKS tunnel that every in-cluster call goes through
//!
//! Bring-up stops at the first failure. Teardown is best-effort up to
//! infrastructure destruction, which always runs.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cluster::kubeconfig::{self, PatchOutcome};
use cluster::manifests::{self, AppManifestContext};
use cluster::readiness::{DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS};
use cluster::{
    tools, AnsiblePing, ClusterError, ClusterTopology, HostKeyReconciler, InfraOutput,
    InventoryRenderer, ReadinessPoller, TunnelConfig, TunnelManager,
};
use tracing::{debug, error, info, warn};

use crate::config::{ClusterConfig, Layout, DEFAULT_PLAYBOOK, REMOTE_KUBECONFIG};
use crate::state::{DownPhase, Phase, UpPhase};
use crate::summary::RunSummary;
use crate::ui;
use crate::validator::{PrerequisitesValidator, Workflow};

/// Bring-up tuning.
#[derive(Debug, Clone)]
pub struct UpOptions {
    /// Playbook that installs Kubernetes.
    pub playbook: PathBuf,
    /// Readiness probe rounds before giving up.
    pub ready_attempts: u32,
    /// Pause between readiness rounds.
    pub ready_interval: Duration,
    /// Skip the interactive Terraform plan confirmation.
    pub auto_approve: bool,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            playbook: PathBuf::from(DEFAULT_PLAYBOOK),
            ready_attempts: DEFAULT_MAX_ATTEMPTS,
            ready_interval: DEFAULT_INTERVAL,
            auto_approve: false,
        }
    }
}

/// Teardown tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownOptions {
    /// Skip in-cluster cleanup and destroy the infrastructure directly.
    pub force_infra_only: bool,
}

/// Short name of the error kind behind `err`, for the fatal-exit report.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ClusterError>())
        .map_or("Error", ClusterError::kind)
}

/// Why in-cluster cleanup cannot run during teardown, if it cannot.
pub fn apps_skip_reason(
    force_infra_only: bool,
    topology: Option<&ClusterTopology>,
    kubeconfig_exists: bool,
) -> Option<&'static str> {
    if force_infra_only {
        Some("Skipping Kubernetes cleanup (--force-infra-only selected)")
    } else if topology.is_none() {
        Some("Skipping Kubernetes cleanup: cluster address information unavailable")
    } else if !kubeconfig_exists {
        Some("Skipping Kubernetes cleanup: kubeconfig file not found")
    } else {
        None
    }
}

/// A bring-up error and the phase it happened in.
#[derive(Debug)]
struct UpFailure {
    phase: UpPhase,
    error: anyhow::Error,
}

impl UpFailure {
    fn at(phase: UpPhase) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| Self { phase, error }
    }
}

// Inside the tunnel scope, bare cluster errors come from starting the tunnel.
impl From<ClusterError> for UpFailure {
    fn from(e: ClusterError) -> Self {
        Self {
            phase: UpPhase::TunnelUp,
            error: e.into(),
        }
    }
}

/// Drives the external tools through the bring-up and teardown phases.
pub struct Orchestrator {
    config: ClusterConfig,
    layout: Layout,
    tunnel: TunnelManager,
    topology: Option<ClusterTopology>,
}

impl Orchestrator {
    pub fn new(config: ClusterConfig, layout: Layout) -> Self {
        let tunnel = TunnelConfig::new(config.ssh_private_key.clone()).with_socks_port(config.socks_port);
        Self::with_tunnel(config, layout, tunnel)
    }

    /// Use a specific tunnel configuration (program, grace period).
    pub fn with_tunnel(config: ClusterConfig, layout: Layout, tunnel: TunnelConfig) -> Self {
        Self {
            config,
            layout,
            tunnel: TunnelManager::new(tunnel),
            topology: None,
        }
    }

    fn topology(&self) -> Result<&ClusterTopology> {
        self.topology
            .as_ref()
            .context("Cluster topology has not been resolved")
    }

    /// Bring the cluster up.
    ///
    /// # Errors
    ///
    /// Returns the first phase error. The tunnel never outlives this call.
    pub async fn up(&mut self, options: &UpOptions) -> Result<()> {
        ui::print_workflow_start("Starting Cluster Setup", self.layout.root());
        info!(workdir = %self.layout.root().display(), "Starting cluster bring-up");

        let mut phase = UpPhase::Init;
        while phase != UpPhase::Done {
            ui::print_phase(phase);
            phase = match self.execute_up_phase(phase, options).await {
                Ok(next) => next,
                Err(UpFailure { phase, error }) => {
                    Self::report_failure("Bring-up", phase, &error);
                    return Err(error);
                }
            };
        }

        let topology = self.topology()?;
        let summary = RunSummary::new(topology, &self.layout);
        summary.write(&self.layout.summary())?;
        ui::print_setup_complete();
        summary.print();
        Ok(())
    }

    /// Run `phase` and return the phase to run next.
    async fn execute_up_phase(
        &mut self,
        phase: UpPhase,
        options: &UpOptions,
    ) -> std::result::Result<UpPhase, UpFailure> {
        debug!(?phase, "Executing phase");
        let at = UpFailure::at(phase);
        match phase {
            UpPhase::Init => PrerequisitesValidator::new(Workflow::Up).validate().map_err(at)?,
            UpPhase::InfraUp => self.infra_up(options.auto_approve).await.map_err(at)?,
            UpPhase::ConfigApply => self.config_apply(options).await.map_err(at)?,
            UpPhase::CredentialFetch => self.credential_fetch().await.map_err(at)?,
            // AppsApply runs inside the tunnel's scope, so both phases end here.
            UpPhase::TunnelUp | UpPhase::AppsApply => {
                self.apps_apply_through_tunnel().await?;
                return Ok(UpPhase::Done);
            }
            UpPhase::Done => {}
        }
        Ok(phase.next())
    }

    async fn infra_up(&mut self, auto_approve: bool) -> Result<()> {
        let env = self.config.terraform_env();
        let infra_dir = self.layout.terraform_infra_dir();

        ui::print_progress("Applying Terraform");
        tools::terraform_apply(&infra_dir, &env, auto_approve)
            .await
            .context("Terraform apply failed or was cancelled")?;

        ui::print_progress("Capturing Terraform output");
        let json = tools::terraform_output_json(&infra_dir, &env, &self.layout.output_json(), false)
            .await
            .context("Failed to get Terraform output")?;

        let topology = cluster::resolve(&InfraOutput::parse(&json)?)?;
        info!(
            control_plane = %topology.control_plane().name,
            workers = topology.workers().count(),
            bastion = ?topology.bastion().map(|b| &b.address),
            "Cluster topology resolved"
        );

        ui::print_progress("Generating Ansible inventory");
        InventoryRenderer::new(self.config.ssh_private_key.clone())
            .write(&topology, &self.layout.inventory())?;
        ui::print_success(&format!(
            "Inventory saved to {}",
            self.layout.inventory().display()
        ));

        HostKeyReconciler::new()
            .reconcile(&self.layout.output_json())
            .await;

        self.topology = Some(topology);
        Ok(())
    }

    async fn config_apply(&self, options: &UpOptions) -> Result<()> {
        let inventory = self.layout.inventory();

        ui::print_progress("Waiting for SSH on all hosts");
        let readiness = ReadinessPoller::new(AnsiblePing)
            .wait(&inventory, options.ready_attempts, options.ready_interval)
            .await;
        if !readiness.ready {
            return Err(ClusterError::tool(
                "ansible",
                format!("hosts not reachable after {} attempts", readiness.attempts),
            )
            .into());
        }
        ui::print_success("All hosts reachable");

        let playbook = self.layout.resolve(&options.playbook);
        ui::print_progress(&format!("Running {}", playbook.display()));
        tools::ansible_playbook(&inventory, &playbook)
            .await
            .context("Ansible playbook failed")?;
        Ok(())
    }

    async fn credential_fetch(&self) -> Result<()> {
        let route = self.topology()?.tunnel_route();
        let kubeconfig = self.layout.kubeconfig();

        ui::print_progress(&format!("Copying {REMOTE_KUBECONFIG} from {}", route.target));
        tools::scp_from(
            &self.tunnel.config().user,
            &route.target,
            route.bastion.as_deref(),
            &self.config.ssh_private_key,
            REMOTE_KUBECONFIG,
            &kubeconfig,
        )
        .await
        .context("Failed to download kubeconfig")?;

        match kubeconfig::patch(&kubeconfig, &self.tunnel.proxy_url())? {
            PatchOutcome::Patched => ui::print_success("Kubeconfig patched with SOCKS5 proxy"),
            PatchOutcome::AlreadyPatched => ui::print_info("Kubeconfig already carries a proxy-url"),
        }
        Ok(())
    }

    async fn apps_apply_through_tunnel(&mut self) -> std::result::Result<(), UpFailure> {
        let Self {
            ref config,
            ref layout,
            ref mut tunnel,
            ref topology,
        } = *self;
        let topology = topology
            .as_ref()
            .context("Cluster topology has not been resolved")
            .map_err(UpFailure::at(UpPhase::TunnelUp))?;
        let proxy_url = tunnel.proxy_url();

        tunnel
            .scoped(&topology.tunnel_route(), || async move {
                ui::print_tunnel_established(&proxy_url);
                ui::print_phase(UpPhase::AppsApply);
                apps_apply(config, layout, topology)
                    .await
                    .map_err(UpFailure::at(UpPhase::AppsApply))
            })
            .await
    }

    /// Tear the cluster down.
    ///
    /// # Errors
    ///
    /// Returns an error only if prerequisites are missing or the
    /// infrastructure destroy fails.
    pub async fn down(&mut self, options: DownOptions) -> Result<()> {
        ui::print_workflow_start("Starting Cluster Teardown", self.layout.root());
        info!(workdir = %self.layout.root().display(), "Starting cluster teardown");

        let mut phase = DownPhase::Init;
        while phase != DownPhase::Done {
            ui::print_phase(phase);
            match self.execute_down_phase(phase, options).await {
                Ok(next) => phase = next,
                Err(e) => {
                    Self::report_failure("Teardown", phase, &e);
                    return Err(e);
                }
            }
        }

        ui::print_teardown_complete();
        Ok(())
    }

    /// Run `phase` and return the phase to run next.
    async fn execute_down_phase(&mut self, phase: DownPhase, options: DownOptions) -> Result<DownPhase> {
        debug!(?phase, "Executing phase");
        match phase {
            DownPhase::Init => PrerequisitesValidator::new(Workflow::Down).validate()?,
            DownPhase::InfoRefresh => self.info_refresh(options.force_infra_only).await,
            // AppsDestroy runs inside the tunnel's scope, so both phases end here.
            DownPhase::TunnelUp | DownPhase::AppsDestroy => {
                self.cleanup_through_tunnel(options.force_infra_only).await;
                return Ok(DownPhase::InfraDestroy);
            }
            DownPhase::InfraDestroy => {
                tools::terraform_destroy(&self.layout.terraform_infra_dir(), &self.config.terraform_env())
                    .await
                    .context("Terraform infra destroy failed")?;
            }
            DownPhase::Done => {}
        }
        Ok(phase.next())
    }

    async fn info_refresh(&mut self, force_infra_only: bool) {
        let output_json = self.layout.output_json();
        match tools::terraform_output_json(
            &self.layout.terraform_infra_dir(),
            &self.config.terraform_env(),
            &output_json,
            true,
        )
        .await
        {
            Ok(_) => debug!(path = %output_json.display(), "Terraform output refreshed"),
            Err(e) => {
                warn!(error = %e, "Could not refresh Terraform output");
                ui::print_warning(
                    "Could not get Terraform output. Infrastructure might already be partially destroyed.",
                );
            }
        }

        HostKeyReconciler::new().reconcile(&output_json).await;

        if force_infra_only {
            return;
        }

        let resolved = InfraOutput::load(&output_json).and_then(|doc| cluster::resolve(&doc));
        match resolved {
            Ok(topology) => self.topology = Some(topology),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Cluster topology unavailable");
                ui::print_warning(&format!("Cluster topology unavailable: {e}"));
            }
        }
    }

    async fn cleanup_through_tunnel(&mut self, force_infra_only: bool) {
        let kubeconfig_exists = self.layout.kubeconfig().exists();
        let Self {
            ref config,
            ref layout,
            ref mut tunnel,
            ref topology,
        } = *self;

        if let Some(reason) = apps_skip_reason(force_infra_only, topology.as_ref(), kubeconfig_exists) {
            ui::print_warning(reason);
            return;
        }
        let Some(topology) = topology.as_ref() else {
            return;
        };
        let proxy_url = tunnel.proxy_url();

        let cleaned = tunnel
            .scoped(&topology.tunnel_route(), || async move {
                ui::print_tunnel_established(&proxy_url);
                ui::print_phase(DownPhase::AppsDestroy);
                apps_destroy(config, layout, topology).await;
                Ok::<(), ClusterError>(())
            })
            .await;

        if let Err(e) = cleaned {
            warn!(kind = e.kind(), error = %e, "Tunnel failed; skipping Kubernetes cleanup");
            ui::print_warning(&format!("Skipping Kubernetes cleanup: {e}"));
        }
    }

    fn report_failure<P: Phase>(workflow: &str, phase: P, err: &anyhow::Error) {
        let kind = error_kind(err);
        error!(phase = %phase, kind, error = %err, "{workflow} failed");
        ui::print_failure(workflow, phase, kind, err);
    }
}

async fn apps_apply(config: &ClusterConfig, layout: &Layout, topology: &ClusterTopology) -> Result<()> {
    let kubeconfig = layout.kubeconfig();
    let env = config.apps_env(topology.control_plane_public(), &kubeconfig);

    ui::print_progress("Applying Terraform (Kubernetes)");
    tools::terraform_apply(&layout.terraform_k8s_dir(), &env, true)
        .await
        .context("Terraform (Kubernetes) apply failed")?;

    let manifest = layout.app_manifest();
    manifests::write_app_manifest(&AppManifestContext::for_domain(&config.zone_domain), &manifest)?;

    ui::print_progress("Deploying example nginx app");
    tools::kubectl(&kubeconfig)
        .arg("apply")
        .arg("-f")
        .arg(&manifest)
        .run()
        .await
        .context("Failed to apply example app manifest")?;
    Ok(())
}

/// Best-effort in-cluster cleanup; failures are warnings.
async fn apps_destroy(config: &ClusterConfig, layout: &Layout, topology: &ClusterTopology) {
    let kubeconfig = layout.kubeconfig();
    let env = config.apps_env(topology.control_plane_public(), &kubeconfig);

    ui::print_progress("Destroying Terraform (Kubernetes)");
    if let Err(e) = tools::terraform_destroy(&layout.terraform_k8s_dir(), &env).await {
        warn!(error = %e, "Kubernetes Terraform destroy failed");
        ui::print_warning(&format!("{e}. Proceeding to infrastructure destroy anyway."));
    }

    let manifest = layout.app_manifest();
    if manifest.exists() {
        ui::print_progress("Deleting example nginx app");
        let deleted = tools::kubectl(&kubeconfig)
            .arg("delete")
            .arg("-f")
            .arg(&manifest)
            .arg("--ignore-not-found=true")
            .run()
            .await;
        if let Err(e) = deleted {
            warn!(error = %e, "Example app delete failed");
            ui::print_warning(&e.to_string());
        }
    }
}
