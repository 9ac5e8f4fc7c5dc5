//! Example application manifest deployed after bring-up.
//!
//! An nginx Deployment behind an Ingress on `app.<domain>` with a
//! cert-manager certificate and a forced HTTP→HTTPS redirect. It proves that
//! ingress, DNS, and certificate issuance work end to end.

use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{ClusterError, Result};

const NGINX_APP_TEMPLATE: &str = include_str!("../templates/nginx-app-http-redirect.yaml.hbs");

/// Values substituted into the example application manifest.
#[derive(Debug, Clone, Serialize)]
pub struct AppManifestContext {
    /// Namespace the app is deployed into.
    pub namespace: String,
    /// Public host name served by the Ingress.
    pub host: String,
    /// cert-manager `ClusterIssuer` name.
    pub cluster_issuer: String,
    /// Deployment replicas.
    pub replicas: u32,
}

impl AppManifestContext {
    /// Defaults for `zone_domain`: host `app.<zone_domain>`, Let's Encrypt
    /// production issuer.
    #[must_use]
    pub fn for_domain(zone_domain: &str) -> Self {
        Self {
            namespace: "nginx-app".to_string(),
            host: format!("app.{zone_domain}"),
            cluster_issuer: "letsencrypt-prod".to_string(),
            replicas: 2,
        }
    }
}

/// Render the example application manifest.
///
/// # Errors
/// Returns [`ClusterError::Template`] if rendering fails.
pub fn render_app_manifest(context: &AppManifestContext) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);

    handlebars
        .register_template_string("nginx-app", NGINX_APP_TEMPLATE)
        .map_err(|e| ClusterError::Template(format!("Invalid app template: {e}")))?;

    handlebars
        .render("nginx-app", context)
        .map_err(|e| ClusterError::Template(format!("Failed to render app manifest: {e}")))
}

/// Render the manifest and write it to `path`, replacing any previous file.
///
/// # Errors
/// Returns an error if rendering or writing fails.
pub fn write_app_manifest(context: &AppManifestContext, path: &Path) -> Result<()> {
    std::fs::write(path, render_app_manifest(context)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_for_domain() {
        let manifest = render_app_manifest(&AppManifestContext::for_domain("example.com")).unwrap();
        assert!(manifest.contains("- host: app.example.com"));
        assert!(manifest.contains("cert-manager.io/cluster-issuer: letsencrypt-prod"));
        assert!(manifest.contains("replicas: 2"));
        assert!(!manifest.contains("{{"));
        assert_eq!(manifest.matches("\n---\n").count(), 3);
    }

    #[test]
    fn test_write_app_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tmpfile_nginx-app-http-redirect.yaml");
        write_app_manifest(&AppManifestContext::for_domain("example.org"), &path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("app.example.org"));
    }
}
