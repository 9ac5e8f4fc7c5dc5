//! Hetzner cluster CLI library.
//!
//! Drives the bring-up and teardown workflows from other crates or tests.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use cluster_cli::{ClusterConfig, Layout, Orchestrator, UpOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClusterConfig::new(
//!         "example.com",
//!         std::env::var("HCLOUD_TOKEN")?,
//!         Path::new("~/.ssh/id_ed25519.pub"),
//!         Path::new("~/.ssh/id_ed25519"),
//!     )?
//!     .with_acme_email(Some("ops@example.com".into()));
//!     let mut orchestrator = Orchestrator::new(config, Layout::new(Path::new("."))?);
//!     orchestrator.up(&UpOptions::default()).await
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod commands;
pub mod config;
pub mod orchestrator;
pub mod state;
pub mod summary;
pub mod ui;
pub mod validator;

// Re-export commonly used types at the crate root
pub use config::{ClusterConfig, Layout};
pub use orchestrator::{DownOptions, Orchestrator, UpOptions};
pub use state::{DownPhase, UpPhase};
