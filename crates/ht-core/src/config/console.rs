//! Console configuration

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, tilde_path};
use super::HostEntry;
use crate::error::ConfigError;
use crate::types::TerminalSize;

/// Environment variable naming the agent socket
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// How server host keys are verified during each hop's handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept every host key without verification
    AcceptAny,
    /// Require a matching entry in the known-hosts file
    #[default]
    KnownHosts,
    /// Record unknown keys, reject changed ones
    AcceptNew,
}

/// Configuration for the operator console
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Login user for hops that do not name one
    pub username: String,

    /// Directory scanned for `id_*` private keys
    #[serde(with = "tilde_path")]
    pub ssh_dir: PathBuf,

    /// Offer agent-held keys when an agent socket is configured
    pub use_agent: bool,

    /// Host key verification policy
    pub host_key_policy: HostKeyPolicy,

    /// Known-hosts file used by the verifying policies
    #[serde(with = "tilde_path")]
    pub known_hosts_path: PathBuf,

    /// Per-hop dial + handshake timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Transport keepalive interval
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Directory that receives per-session log files
    #[serde(with = "tilde_path")]
    pub log_dir: PathBuf,

    /// Pty size used when the live view cannot report one
    pub default_size: TerminalSize,

    /// Fleet inventory
    pub hosts: Vec<HostEntry>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");

        Self {
            username: whoami::username(),
            known_hosts_path: ssh_dir.join("known_hosts"),
            ssh_dir,
            use_agent: true,
            host_key_policy: HostKeyPolicy::default(),
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            log_dir: PathBuf::from("."),
            default_size: TerminalSize::default(),
            hosts: vec![],
        }
    }
}

impl ConsoleConfig {
    /// Agent socket to use, if enabled and present in the environment
    pub fn agent_socket(&self) -> Option<PathBuf> {
        if !self.use_agent {
            return None;
        }
        std::env::var_os(AGENT_SOCKET_ENV)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }

    /// Inventory entries carrying any of `tags` (all entries when `tags` is empty)
    pub fn hosts_with_tags(&self, tags: &[String]) -> Vec<&HostEntry> {
        self.hosts
            .iter()
            .filter(|h| tags.is_empty() || tags.iter().any(|t| h.has_tag(t)))
            .collect()
    }

    /// Reject unparseable chains, colliding titles and titles that would
    /// share a log file
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut titles = HashSet::new();
        let mut log_files = HashMap::new();
        for host in &self.hosts {
            host.chain_spec()?;
            if !titles.insert(host.title()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate host title '{}'",
                    host.title()
                )));
            }
            if let Some(other) = log_files.insert(host.log_file_name(), host.title()) {
                return Err(ConfigError::Invalid(format!(
                    "host titles '{}' and '{}' share the log file {}",
                    other,
                    host.title(),
                    host.log_file_name()
                )));
            }
        }
        Ok(())
    }
}
