//! SSH argument construction shared by the tunnel, `scp`, and the inventory.
//!
//! Cluster hosts are recreated on every up/down cycle and are never
//! pre-trusted, so every connection disables host-key verification and keeps
//! the operator's `known_hosts` untouched.

use std::path::Path;

/// Default SSH user on freshly provisioned nodes.
pub const DEFAULT_SSH_USER: &str = "root";

/// Standard SSH port, used for `[addr]:22` known-hosts entries.
pub const SSH_PORT: u16 = 22;

/// Options that turn off host-key verification and known-hosts bookkeeping.
pub const RELAXED_HOST_KEY_OPTIONS: [&str; 4] = [
    "StrictHostKeyChecking=no",
    "UserKnownHostsFile=/dev/null",
    "GlobalKnownHostsFile=/dev/null",
    "CheckHostIP=no",
];

/// `-o <opt>` argument pairs for [`RELAXED_HOST_KEY_OPTIONS`].
#[must_use]
pub fn relaxed_option_args() -> Vec<String> {
    RELAXED_HOST_KEY_OPTIONS
        .iter()
        .flat_map(|opt| ["-o".to_string(), (*opt).to_string()])
        .collect()
}

/// Quote `value` for `sh`, which `ssh` uses to run a `ProxyCommand`.
///
/// Plain paths are returned unchanged.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+@:,=".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Relay command that forwards stdio to `%h:%p` through `bastion`.
///
/// Suitable as a `ProxyCommand`; `ssh` substitutes the final host and port.
#[must_use]
pub fn proxy_command(user: &str, bastion: &str, identity: &Path) -> String {
    let options = RELAXED_HOST_KEY_OPTIONS
        .iter()
        .map(|opt| format!("-o {opt}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "ssh {options} -i {} -W %h:%p -q {user}@{bastion}",
        shell_quote(&identity.display().to_string())
    )
}

/// `user@host` destination.
#[must_use]
pub fn destination(user: &str, host: &str) -> String {
    format!("{user}@{host}")
}
