//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Port implied when a hop does not name one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Separator between hops in a chain specification
pub const CHAIN_SEPARATOR: char = '/';

/// One network endpoint in a chain: `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HopAddress {
    /// Login user for this hop (falls back to the configured user)
    pub user: Option<String>,
    /// Hostname or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl HopAddress {
    /// Create a hop on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            user: None,
            host: host.into(),
            port: DEFAULT_SSH_PORT,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// `host:port` as understood by the network layer
    pub fn socket_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Login user for this hop, or `default` when none was given
    pub fn user_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.user.as_deref().unwrap_or(default)
    }
}

impl fmt::Display for HopAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.socket_address())
    }
}

impl FromStr for HopAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidChain(format!("hop '{}': {}", s, reason));

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid("empty user")),
            None => (None, s),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6-literal] or [v6-literal]:port
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(invalid("unexpected text after ']'")),
                },
            }
        } else if rest.matches(':').count() == 1 {
            let (host, port) = rest.split_once(':').unwrap_or((rest, ""));
            (host, Some(port))
        } else {
            // no port, or a bare IPv6 literal
            (rest, None)
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| invalid("invalid port"))?,
            None => DEFAULT_SSH_PORT,
        };

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }
}

/// An ordered, non-empty list of hops (`a/b/c` reaches `c` through `b` through `a`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainSpec {
    hops: Vec<HopAddress>,
}

impl ChainSpec {
    /// Parse a slash-delimited chain specification
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ConfigError::InvalidChain(
                "chain specification is empty".to_string(),
            ));
        }

        let hops = spec
            .split(CHAIN_SEPARATOR)
            .map(str::parse)
            .collect::<Result<Vec<HopAddress>, _>>()?;

        Ok(Self { hops })
    }

    /// Build a chain from already-parsed hops
    pub fn from_hops(hops: Vec<HopAddress>) -> Result<Self, ConfigError> {
        if hops.is_empty() {
            return Err(ConfigError::InvalidChain(
                "chain must contain at least one hop".to_string(),
            ));
        }
        Ok(Self { hops })
    }

    /// The hops, first (directly reachable) to last (target)
    pub fn hops(&self) -> &[HopAddress] {
        &self.hops
    }

    /// Number of hops
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// The final hop
    pub fn target(&self) -> &HopAddress {
        // non-empty by construction
        &self.hops[self.hops.len() - 1]
    }

    /// Joined keys for every prefix: `a:22`, `a:22/b:22`, ...
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefix = String::new();
        self.hops
            .iter()
            .map(|hop| {
                if !prefix.is_empty() {
                    prefix.push(CHAIN_SEPARATOR);
                }
                prefix.push_str(&hop.to_string());
                prefix.clone()
            })
            .collect()
    }
}

impl fmt::Display for ChainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", CHAIN_SEPARATOR)?;
            }
            write!(f, "{}", hop)?;
        }
        Ok(())
    }
}

impl FromStr for ChainSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Terminal dimensions used to size remote ptys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl fmt::Display for TerminalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
