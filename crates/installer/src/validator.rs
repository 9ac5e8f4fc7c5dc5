use anyhow::Result;
use cluster::ClusterError;
use colored::Colorize;

use crate::ui;

/// Which workflow the prerequisites are checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Up,
    Down,
}

struct Requirement {
    name: &'static str,
    install_instructions: &'static str,
}

const TERRAFORM: Requirement = Requirement {
    name: "terraform",
    install_instructions: "Install Terraform from https://developer.hashicorp.com/terraform/install",
};
const SSH: Requirement = Requirement {
    name: "ssh",
    install_instructions: "Install the OpenSSH client",
};
const SSH_KEYGEN: Requirement = Requirement {
    name: "ssh-keygen",
    install_instructions: "Install the OpenSSH client",
};
const SCP: Requirement = Requirement {
    name: "scp",
    install_instructions: "Install the OpenSSH client",
};
const ANSIBLE: Requirement = Requirement {
    name: "ansible",
    install_instructions: "Install Ansible from https://docs.ansible.com/ansible/latest/installation_guide/",
};
const ANSIBLE_PLAYBOOK: Requirement = Requirement {
    name: "ansible-playbook",
    install_instructions: "Install Ansible from https://docs.ansible.com/ansible/latest/installation_guide/",
};
const KUBECTL: Requirement = Requirement {
    name: "kubectl",
    install_instructions: "Install kubectl from https://kubernetes.io/docs/tasks/tools/",
};

/// Validates that the external tools a workflow drives are on `PATH`.
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

impl PrerequisitesValidator {
    pub fn new(workflow: Workflow) -> Self {
        let requirements = match workflow {
            Workflow::Up => vec![TERRAFORM, SSH, SSH_KEYGEN, ANSIBLE, ANSIBLE_PLAYBOOK, SCP, KUBECTL],
            Workflow::Down => vec![TERRAFORM, SSH, SSH_KEYGEN],
        };
        Self { requirements }
    }

    /// Names of the tools this validator checks.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.requirements.iter().map(|r| r.name).collect()
    }

    /// Check every tool, printing one line per tool.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::ExternalToolFailed`] naming the first missing tool.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&Requirement> = self
            .requirements
            .iter()
            .filter(|requirement| {
                let found = which::which(requirement.name);
                ui::print_tool_check(requirement.name, found.as_deref().ok());
                found.is_err()
            })
            .collect();

        println!();

        let Some(first) = missing.first() else {
            ui::print_success("All prerequisites met!");
            return Ok(());
        };

        ui::print_warning("Some prerequisites are not met:");
        println!();
        for failure in &missing {
            println!(
                "  {} {} - {}",
                "✗".red(),
                failure.name.red(),
                failure.install_instructions.bright_black()
            );
        }
        println!();

        Err(ClusterError::tool(first.name, "not installed or not on PATH").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_up_requires_more_tools_than_down() {
        let up = PrerequisitesValidator::new(Workflow::Up).tool_names();
        let down = PrerequisitesValidator::new(Workflow::Down).tool_names();

        for tool in &down {
            assert!(up.contains(tool), "{tool} missing from up");
        }
        assert!(up.contains(&"ansible-playbook"));
        assert!(up.contains(&"scp"));
        assert!(up.contains(&"kubectl"));
    }

    #[test]
    fn test_down_only_needs_terraform_and_ssh() {
        assert_eq!(
            PrerequisitesValidator::new(Workflow::Down).tool_names(),
            vec!["terraform", "ssh", "ssh-keygen"]
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_down_passes_without_kubectl() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for tool in ["terraform", "ssh", "ssh-keygen"] {
            let path = dir.path().join(tool);
            std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let saved = std::env::var_os("PATH");
        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::set_var("PATH", dir.path());
        }
        let down = PrerequisitesValidator::new(Workflow::Down).validate();
        let up = PrerequisitesValidator::new(Workflow::Up).validate();
        // SAFETY: as above
        unsafe {
            match saved {
                Some(path) => std::env::set_var("PATH", path),
                None => std::env::remove_var("PATH"),
            }
        }

        assert!(down.is_ok(), "{down:?}");
        assert!(up.is_err());
    }

    #[test]
    fn test_missing_tool_is_external_tool_failure() {
        let validator = PrerequisitesValidator {
            requirements: vec![Requirement {
                name: "definitely-not-a-real-tool-hcluster",
                install_instructions: "n/a",
            }],
        };
        let err = validator.validate().unwrap_err();
        let cluster_err = err.downcast_ref::<ClusterError>().unwrap();
        assert_eq!(cluster_err.kind(), "ExternalToolFailed");
    }
}
