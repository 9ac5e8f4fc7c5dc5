//! Waiting for cluster nodes to accept management connections.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::inventory;
use crate::tools::Tool;

/// Default number of probe rounds.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default pause between probe rounds.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// A connectivity check against every host in an inventory.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether every host in `inventory` answered.
    async fn probe(&self, inventory: &Path) -> bool;
}

/// Probes hosts with `ansible all -m ping`, discarding its output.
#[derive(Debug, Clone, Default)]
pub struct AnsiblePing;

#[async_trait]
impl ConnectivityProbe for AnsiblePing {
    async fn probe(&self, inventory: &Path) -> bool {
        Tool::new("ansible")
            .arg("all")
            .arg("-i")
            .arg(inventory)
            .args(["-m", "ping"])
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .succeeds()
            .await
    }
}

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Whether all hosts answered.
    pub ready: bool,
    /// Probe rounds used.
    pub attempts: u32,
}

/// Bounded-retry wait for host connectivity.
#[derive(Debug, Clone)]
pub struct ReadinessPoller<P> {
    probe: P,
}

impl<P: ConnectivityProbe> ReadinessPoller<P> {
    /// Create a poller around `probe`.
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Probe until every host answers or `max_attempts` rounds are used.
    ///
    /// Sleeps `interval` between failed rounds, never after the last one.
    /// Running out of attempts is reported, not raised; the caller decides
    /// whether it is fatal.
    pub async fn wait(&self, inventory: &Path, max_attempts: u32, interval: Duration) -> Readiness {
        let hosts = std::fs::read_to_string(inventory)
            .map(|text| inventory::hosts(&text).len())
            .unwrap_or_default();
        info!(
            hosts,
            max_attempts,
            interval_secs = interval.as_secs(),
            "Waiting for hosts to accept SSH"
        );

        let mut attempt = 0;
        while attempt < max_attempts {
            attempt += 1;
            if self.probe.probe(inventory).await {
                info!(attempt, "All hosts reachable");
                return Readiness {
                    ready: true,
                    attempts: attempt,
                };
            }

            if attempt < max_attempts {
                debug!(attempt, max_attempts, "Hosts not reachable yet, retrying in {interval:?}");
                tokio::time::sleep(interval).await;
            }
        }

        warn!(attempts = attempt, "Hosts still unreachable");
        Readiness {
            ready: false,
            attempts: attempt,
        }
    }
}
