//! External tool invocation.
//!
//! Terraform, Ansible, `scp`, and `kubectl` are driven as child processes.
//! Every call blocks the workflow until the tool exits; a non-zero exit is
//! reported as [`ClusterError::ExternalToolFailed`].

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::ssh;

/// Environment overrides passed to a tool.
pub type ToolEnv = Vec<(String, String)>;

/// A single external command invocation.
#[derive(Debug)]
pub struct Tool {
    name: String,
    cmd: Command,
}

impl Tool {
    /// Start building an invocation of `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref();
        Self {
            name: program.to_string_lossy().into_owned(),
            cmd: Command::new(program),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.cmd.arg(arg);
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmd.args(args);
        self
    }

    /// Run in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cmd.current_dir(dir);
        self
    }

    /// Add environment overrides on top of the inherited environment.
    #[must_use]
    pub fn envs(mut self, env: &[(String, String)]) -> Self {
        self.cmd.envs(env.iter().map(|(k, v)| (k, v)));
        self
    }

    /// Set a single environment variable.
    #[must_use]
    pub fn env(mut self, key: &str, value: impl AsRef<OsStr>) -> Self {
        self.cmd.env(key, value);
        self
    }

    /// Discard the tool's own stdout and stderr.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.cmd.stdout(Stdio::null()).stderr(Stdio::null());
        self
    }

    /// Discard only stderr.
    #[must_use]
    pub fn quiet_stderr(mut self) -> Self {
        self.cmd.stderr(Stdio::null());
        self
    }

    /// Run to completion with inherited (or previously redirected) stdio.
    ///
    /// # Errors
    /// Returns [`ClusterError::ExternalToolFailed`] if the tool cannot be
    /// started or exits non-zero.
    pub async fn run(mut self) -> Result<()> {
        debug!(tool = %self.name, "Running external tool");
        let status = self
            .cmd
            .status()
            .await
            .map_err(|e| ClusterError::tool(&self.name, format!("could not start: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(ClusterError::tool(&self.name, status.to_string()))
        }
    }

    /// Run to completion and capture stdout.
    ///
    /// # Errors
    /// Returns [`ClusterError::ExternalToolFailed`] if the tool cannot be
    /// started or exits non-zero; stderr is included when captured.
    pub async fn output(mut self) -> Result<String> {
        debug!(tool = %self.name, "Capturing external tool output");
        self.cmd.stdout(Stdio::piped());
        let output = self
            .cmd
            .output()
            .await
            .map_err(|e| ClusterError::tool(&self.name, format!("could not start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr.trim())
            };
            return Err(ClusterError::tool(&self.name, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run quietly and report only whether the tool exited zero.
    pub async fn succeeds(self) -> bool {
        self.quiet().run().await.is_ok()
    }
}

/// `terraform <args>` in `dir` with `env`.
#[must_use]
pub fn terraform(dir: &Path, env: &[(String, String)]) -> Tool {
    Tool::new("terraform").current_dir(dir).envs(env)
}

/// `terraform init` then `terraform apply`.
///
/// `apply` inherits the terminal so the operator can confirm the plan unless
/// `auto_approve` is set.
///
/// # Errors
/// Returns [`ClusterError::ExternalToolFailed`] if either command fails.
pub async fn terraform_apply(dir: &Path, env: &[(String, String)], auto_approve: bool) -> Result<()> {
    terraform(dir, env).arg("init").run().await?;
    let apply = terraform(dir, env).arg("apply");
    let apply = if auto_approve {
        apply.arg("-auto-approve")
    } else {
        apply
    };
    apply.run().await
}

/// `terraform destroy -auto-approve`.
///
/// # Errors
/// Returns [`ClusterError::ExternalToolFailed`] if the destroy fails.
pub async fn terraform_destroy(dir: &Path, env: &[(String, String)]) -> Result<()> {
    terraform(dir, env)
        .args(["destroy", "-auto-approve"])
        .run()
        .await
}

/// Capture `terraform output -json` and cache it at `cache`.
///
/// # Errors
/// Returns [`ClusterError::ExternalToolFailed`] if Terraform fails, or
/// [`ClusterError::Io`] if the cache cannot be written.
pub async fn terraform_output_json(
    dir: &Path,
    env: &[(String, String)],
    cache: &Path,
    quiet_stderr: bool,
) -> Result<String> {
    let tool = terraform(dir, env).args(["output", "-json"]);
    let tool = if quiet_stderr { tool.quiet_stderr() } else { tool };
    let json = tool.output().await?;
    std::fs::write(cache, &json)?;
    debug!(path = %cache.display(), "Terraform output cached");
    Ok(json)
}

/// `ansible-playbook -i <inventory> <playbook> --become`.
///
/// # Errors
/// Returns [`ClusterError::ExternalToolFailed`] if the playbook run fails.
pub async fn ansible_playbook(inventory: &Path, playbook: &Path) -> Result<()> {
    Tool::new("ansible-playbook")
        .arg("-i")
        .arg(inventory)
        .arg(playbook)
        .arg("--become")
        .env("ANSIBLE_HOST_KEY_CHECKING", "False")
        .run()
        .await
}

/// Copy `remote_path` from `host` to `local`, optionally relaying through a
/// bastion.
///
/// # Errors
/// Returns [`ClusterError::ExternalToolFailed`] if `scp` fails.
pub async fn scp_from(
    user: &str,
    host: &str,
    bastion: Option<&str>,
    identity: &Path,
    remote_path: &str,
    local: &Path,
) -> Result<()> {
    let mut tool = Tool::new("scp").args(ssh::relaxed_option_args());
    if let Some(bastion) = bastion {
        tool = tool
            .arg("-o")
            .arg(format!("ProxyCommand={}", ssh::proxy_command(user, bastion, identity)));
    }
    tool.arg("-i")
        .arg(identity)
        .arg(format!("{}:{remote_path}", ssh::destination(user, host)))
        .arg(local)
        .run()
        .await
}

/// `kubectl <args>` against `kubeconfig`.
#[must_use]
pub fn kubectl(kubeconfig: &Path) -> Tool {
    Tool::new("kubectl").env("KUBECONFIG", kubeconfig)
}
