//! Host key verification policy

use std::path::Path;

use russh_keys::key::PublicKey;

use ht_core::config::HostKeyPolicy;

/// What the known-hosts file says about a presented key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownHostLookup {
    /// A matching entry exists
    Match,
    /// No entry for this host
    Unknown,
    /// An entry exists with a different key, at `line`
    Changed { line: usize },
}

/// Outcome of applying a [`HostKeyPolicy`] to a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyDecision {
    /// Accept the key as is
    Accept,
    /// Accept and record the key in the known-hosts file
    Learn,
    /// Refuse the connection
    Reject(String),
}

impl HostKeyDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, HostKeyDecision::Reject(_))
    }
}

/// Apply `policy` to a known-hosts lookup
pub fn decide(policy: HostKeyPolicy, lookup: &KnownHostLookup) -> HostKeyDecision {
    match (policy, lookup) {
        (HostKeyPolicy::AcceptAny, _) => HostKeyDecision::Accept,
        (_, KnownHostLookup::Match) => HostKeyDecision::Accept,
        (HostKeyPolicy::KnownHosts, KnownHostLookup::Unknown) => {
            HostKeyDecision::Reject("host is not in known_hosts".to_string())
        }
        (HostKeyPolicy::AcceptNew, KnownHostLookup::Unknown) => HostKeyDecision::Learn,
        (_, KnownHostLookup::Changed { line }) => HostKeyDecision::Reject(format!(
            "host key changed (known_hosts line {})",
            line
        )),
    }
}

/// Look `key` up for `host:port` in the known-hosts file at `path`.
///
/// A missing file reads as an empty one.
pub fn lookup(
    host: &str,
    port: u16,
    key: &PublicKey,
    path: &Path,
) -> Result<KnownHostLookup, russh_keys::Error> {
    match russh_keys::check_known_hosts_path(host, port, key, path) {
        Ok(true) => Ok(KnownHostLookup::Match),
        Ok(false) => Ok(KnownHostLookup::Unknown),
        Err(russh_keys::Error::KeyChanged { line }) => Ok(KnownHostLookup::Changed { line }),
        Err(e) => Err(e),
    }
}

/// Append `key` for `host:port` to the known-hosts file at `path`
pub fn learn(
    host: &str,
    port: u16,
    key: &PublicKey,
    path: &Path,
) -> Result<(), russh_keys::Error> {
    russh_keys::learn_known_hosts_path(host, port, key, path)
}
