//! Error taxonomy for cluster operations.

use thiserror::Error;

/// Errors that can occur while resolving, preparing, or reaching a cluster.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The infrastructure-output document is missing a required section or
    /// does not have the expected shape.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The document parsed, but a node this system needs cannot be resolved.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// The background SOCKS tunnel exited before it became usable.
    #[error("SSH tunnel to {target} failed to start{}", .status.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    TunnelStartFailed {
        target: String,
        status: Option<String>,
    },

    /// The credential file lacks the line the patch anchors on.
    #[error("No `{anchor}` line found in {path}")]
    PatchTargetNotFound { path: String, anchor: String },

    /// An external command exited non-zero or could not be run.
    #[error("{tool} failed: {message}")]
    ExternalToolFailed { tool: String, message: String },

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(String),

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Stable short name of the error kind, used in fatal-exit reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MalformedInput",
            Self::InvalidTopology(_) => "InvalidTopology",
            Self::TunnelStartFailed { .. } => "TunnelStartFailed",
            Self::PatchTargetNotFound { .. } => "PatchTargetNotFound",
            Self::ExternalToolFailed { .. } => "ExternalToolFailed",
            Self::Template(_) => "Template",
            Self::Io(_) => "Io",
        }
    }

    /// Whether teardown may log this error and carry on.
    ///
    /// Resolution and tunnel failures only skip the dependent cleanup phase
    /// during teardown; everything else is left to the caller.
    #[must_use]
    pub fn is_degradable_in_teardown(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput(_) | Self::InvalidTopology(_) | Self::TunnelStartFailed { .. }
        )
    }

    /// Shorthand for [`Self::ExternalToolFailed`].
    #[must_use]
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
