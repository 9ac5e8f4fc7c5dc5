//! Routing kubeconfig traffic through the SOCKS tunnel.
//!
//! The admin kubeconfig fetched from the control plane points at an API
//! server on the private network. Adding `proxy-url` next to the cluster's
//! `server` entry makes `kubectl` and the Terraform Kubernetes provider dial
//! through the local tunnel.

use std::path::Path;

use tracing::info;

use crate::error::{ClusterError, Result};

/// Line fragment identifying the cluster API server entry.
pub const SERVER_ANCHOR: &str = "server: https://";

/// Key inserted after the server entry.
pub const PROXY_KEY: &str = "proxy-url:";

/// Result of a successful patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The proxy line was inserted.
    Patched,
    /// A proxy line already follows the server entry; nothing was changed.
    AlreadyPatched,
}

fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Insert a `proxy-url` sibling after the first server entry in `content`.
///
/// Only the first server entry is patched. Returns `None` if there is no
/// server entry.
#[must_use]
pub fn patch_text(content: &str, proxy_url: &str) -> Option<(String, PatchOutcome)> {
    let lines: Vec<&str> = content.lines().collect();
    let idx = lines.iter().position(|line| line.contains(SERVER_ANCHOR))?;

    if lines
        .get(idx + 1)
        .is_some_and(|next| next.trim_start().starts_with(PROXY_KEY))
    {
        return Some((content.to_string(), PatchOutcome::AlreadyPatched));
    }

    let proxy_line = format!("{}{PROXY_KEY} {proxy_url}", indentation(lines[idx]));
    let mut out = String::with_capacity(content.len() + proxy_line.len() + 1);
    for (i, line) in lines.iter().enumerate() {
        out.push_str(line);
        out.push('\n');
        if i == idx {
            out.push_str(&proxy_line);
            out.push('\n');
        }
    }
    if !content.ends_with('\n') {
        out.pop();
    }

    Some((out, PatchOutcome::Patched))
}

/// Patch the kubeconfig at `path` in place.
///
/// # Errors
/// Returns [`ClusterError::PatchTargetNotFound`] if the file has no server
/// entry, or [`ClusterError::Io`] if it cannot be read or written.
pub fn patch(path: &Path, proxy_url: &str) -> Result<PatchOutcome> {
    let content = std::fs::read_to_string(path)?;
    let (patched, outcome) =
        patch_text(&content, proxy_url).ok_or_else(|| ClusterError::PatchTargetNotFound {
            path: path.display().to_string(),
            anchor: SERVER_ANCHOR.to_string(),
        })?;

    if outcome == PatchOutcome::Patched {
        std::fs::write(path, patched)?;
        info!(path = %path.display(), proxy = proxy_url, "Kubeconfig routed through tunnel");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = "\
apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0t
    server: https://127.0.0.1:6443
  name: cluster.local
- cluster:
    server: https://10.0.0.9:6443
  name: other
contexts: []
";

    #[test]
    fn test_inserts_sibling_after_first_server_only() {
        let (out, outcome) = patch_text(KUBECONFIG, "socks5://localhost:1080").unwrap();
        assert_eq!(outcome, PatchOutcome::Patched);
        assert!(out.contains(
            "    server: https://127.0.0.1:6443\n    proxy-url: socks5://localhost:1080\n  name: cluster.local\n"
        ));
        assert_eq!(out.matches(PROXY_KEY).count(), 1);
        assert!(out.contains("    server: https://10.0.0.9:6443\n  name: other\n"));
        assert_eq!(out.lines().count(), KUBECONFIG.lines().count() + 1);
    }

    #[test]
    fn test_matches_tab_indentation() {
        let (out, _) = patch_text("clusters:\n\t\tserver: https://x:6443\n", "socks5://localhost:1080").unwrap();
        assert_eq!(
            out,
            "clusters:\n\t\tserver: https://x:6443\n\t\tproxy-url: socks5://localhost:1080\n"
        );
    }

    #[test]
    fn test_preserves_missing_trailing_newline() {
        let (out, _) = patch_text("  server: https://x:6443", "socks5://localhost:1080").unwrap();
        assert_eq!(out, "  server: https://x:6443\n  proxy-url: socks5://localhost:1080");
    }

    #[test]
    fn test_patching_twice_does_not_duplicate() {
        let (once, _) = patch_text(KUBECONFIG, "socks5://localhost:1080").unwrap();
        let (twice, outcome) = patch_text(&once, "socks5://localhost:1080").unwrap();
        assert_eq!(outcome, PatchOutcome::AlreadyPatched);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_anchor() {
        assert!(patch_text("apiVersion: v1\nclusters: []\n", "socks5://localhost:1080").is_none());
        assert!(patch_text("    server: http://insecure:8080\n", "socks5://localhost:1080").is_none());
    }

    #[test]
    fn test_patch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube_config");
        std::fs::write(&path, KUBECONFIG).unwrap();

        assert_eq!(patch(&path, "socks5://localhost:1080").unwrap(), PatchOutcome::Patched);
        assert_eq!(
            patch(&path, "socks5://localhost:1080").unwrap(),
            PatchOutcome::AlreadyPatched
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(PROXY_KEY).count(), 1);
    }

    #[test]
    fn test_patch_file_without_anchor_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube_config");
        std::fs::write(&path, "apiVersion: v1\n").unwrap();

        let err = patch(&path, "socks5://localhost:1080").unwrap_err();
        assert!(matches!(err, ClusterError::PatchTargetNotFound { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "apiVersion: v1\n");
    }
}
