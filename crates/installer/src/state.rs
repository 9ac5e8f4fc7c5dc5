//! Workflow phases for bring-up and teardown.
//!
//! Phases run strictly in sequence. Each phase knows its successor, a
//! description for the progress banner, and the hint printed when it fails.

/// What the console needs to know about a phase of either workflow.
pub trait Phase: Copy + std::fmt::Display {
    /// Total number of phases after `Init`.
    const TOTAL: u8;

    /// Position for the `[n/N]` progress marker.
    fn position(self) -> u8;

    /// Hint printed when the workflow fails in this phase.
    fn hint(self) -> &'static str;
}

/// Bring-up phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpPhase {
    /// Checking local prerequisites.
    Init,
    /// Provisioning servers with Terraform and writing the inventory.
    InfraUp,
    /// Waiting for SSH and running the Ansible playbook.
    ConfigApply,
    /// Downloading and patching the admin kubeconfig.
    CredentialFetch,
    /// Opening the SOCKS tunnel.
    TunnelUp,
    /// Applying in-cluster resources and the example app.
    AppsApply,
    /// Finished.
    Done,
}

impl UpPhase {
    /// Total number of phases after `Init`.
    pub const TOTAL_STEPS: u8 = 6;

    /// The phase that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Init => Self::InfraUp,
            Self::InfraUp => Self::ConfigApply,
            Self::ConfigApply => Self::CredentialFetch,
            Self::CredentialFetch => Self::TunnelUp,
            Self::TunnelUp => Self::AppsApply,
            Self::AppsApply | Self::Done => Self::Done,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Init => "Checking prerequisites",
            Self::InfraUp => "Provisioning infrastructure (Terraform)",
            Self::ConfigApply => "Installing Kubernetes (Ansible)",
            Self::CredentialFetch => "Fetching kubeconfig",
            Self::TunnelUp => "Establishing SOCKS5 tunnel",
            Self::AppsApply => "Deploying cluster applications",
            Self::Done => "Complete",
        }
    }

    /// Step number for progress display.
    #[must_use]
    pub fn step_number(self) -> u8 {
        match self {
            Self::Init => 1,
            Self::InfraUp => 2,
            Self::ConfigApply => 3,
            Self::CredentialFetch => 4,
            Self::TunnelUp => 5,
            Self::AppsApply | Self::Done => 6,
        }
    }

    /// What the operator should do after a failure in this phase.
    #[must_use]
    pub fn recovery_hint(self) -> &'static str {
        match self {
            Self::Init => "Install the missing tools and re-run `hcluster up`.",
            Self::InfraUp => {
                "Check the Terraform output above, fix the cause, and re-run `hcluster up`. \
                 Run `hcluster down` to remove partially created servers."
            }
            Self::ConfigApply => {
                "Servers are up but Kubernetes is not installed. Check SSH access via the \
                 bastion and re-run `hcluster up`, or run `hcluster down` to clean up."
            }
            Self::CredentialFetch => {
                "Kubernetes may be installed but the kubeconfig could not be prepared. \
                 Re-run `hcluster up` or run `hcluster down` to clean up."
            }
            Self::TunnelUp => {
                "Make sure the local SOCKS port is free and the control plane accepts SSH, \
                 then re-run `hcluster up`."
            }
            Self::AppsApply => {
                "The cluster is up but applications failed to deploy. Re-run `hcluster up` \
                 or run `hcluster down` to clean up."
            }
            Self::Done => "",
        }
    }
}

impl Phase for UpPhase {
    const TOTAL: u8 = Self::TOTAL_STEPS;

    fn position(self) -> u8 {
        self.step_number()
    }

    fn hint(self) -> &'static str {
        self.recovery_hint()
    }
}

impl std::fmt::Display for UpPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Teardown phases.
///
/// `TunnelUp` and `AppsDestroy` are skipped when cluster access is not
/// possible or not requested; infrastructure destruction always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DownPhase {
    /// Checking local prerequisites.
    Init,
    /// Refreshing Terraform output and cleaning known_hosts.
    InfoRefresh,
    /// Opening the SOCKS tunnel for in-cluster cleanup.
    TunnelUp,
    /// Destroying in-cluster resources.
    AppsDestroy,
    /// Destroying servers, network, and DNS.
    InfraDestroy,
    /// Finished.
    Done,
}

impl DownPhase {
    /// Total number of phases after `Init`.
    pub const TOTAL_STEPS: u8 = 5;

    /// The phase that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Init => Self::InfoRefresh,
            Self::InfoRefresh => Self::TunnelUp,
            Self::TunnelUp => Self::AppsDestroy,
            Self::AppsDestroy => Self::InfraDestroy,
            Self::InfraDestroy | Self::Done => Self::Done,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Init => "Checking prerequisites",
            Self::InfoRefresh => "Refreshing Terraform output",
            Self::TunnelUp => "Establishing SOCKS5 tunnel",
            Self::AppsDestroy => "Destroying Kubernetes resources",
            Self::InfraDestroy => "Destroying infrastructure (Terraform)",
            Self::Done => "Complete",
        }
    }

    /// Step number for progress display.
    #[must_use]
    pub fn step_number(self) -> u8 {
        match self {
            Self::Init => 1,
            Self::InfoRefresh => 2,
            Self::TunnelUp => 3,
            Self::AppsDestroy => 4,
            Self::InfraDestroy | Self::Done => 5,
        }
    }

    /// What the operator should do after a fatal failure in this phase.
    #[must_use]
    pub fn recovery_hint(self) -> &'static str {
        match self {
            Self::Init => "Install the missing tools and re-run `hcluster down`.",
            Self::InfraDestroy => {
                "Terraform infra destroy failed. You may need to clean up manually via the \
                 Hetzner Cloud Console."
            }
            Self::InfoRefresh | Self::TunnelUp | Self::AppsDestroy | Self::Done => "",
        }
    }
}

impl Phase for DownPhase {
    const TOTAL: u8 = Self::TOTAL_STEPS;

    fn position(self) -> u8 {
        self.step_number()
    }

    fn hint(self) -> &'static str {
        self.recovery_hint()
    }
}

impl std::fmt::Display for DownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_phase_sequence() {
        let mut phase = UpPhase::Init;
        let mut seen = vec![phase];
        while phase != UpPhase::Done {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                UpPhase::Init,
                UpPhase::InfraUp,
                UpPhase::ConfigApply,
                UpPhase::CredentialFetch,
                UpPhase::TunnelUp,
                UpPhase::AppsApply,
                UpPhase::Done,
            ]
        );
        assert_eq!(UpPhase::Done.next(), UpPhase::Done);
    }

    #[test]
    fn test_down_phase_sequence() {
        assert_eq!(DownPhase::Init.next(), DownPhase::InfoRefresh);
        assert_eq!(DownPhase::InfoRefresh.next(), DownPhase::TunnelUp);
        assert_eq!(DownPhase::AppsDestroy.next(), DownPhase::InfraDestroy);
        assert_eq!(DownPhase::InfraDestroy.next(), DownPhase::Done);
    }

    #[test]
    fn test_step_numbers_within_total() {
        for phase in [
            UpPhase::Init,
            UpPhase::InfraUp,
            UpPhase::ConfigApply,
            UpPhase::CredentialFetch,
            UpPhase::TunnelUp,
            UpPhase::AppsApply,
        ] {
            assert!(phase.step_number() <= UpPhase::TOTAL_STEPS);
            assert!(!phase.recovery_hint().is_empty());
        }
        assert!(DownPhase::InfraDestroy
            .recovery_hint()
            .contains("Hetzner Cloud Console"));
    }
}
