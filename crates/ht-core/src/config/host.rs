//! Fleet inventory entries

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ChainSpec;

/// Transcript file name for a session title.
///
/// Path separators become `_`, so distinct titles such as `a/b` and `a_b`
/// share a file name; callers must treat that as a collision.
pub fn log_file_name(title: &str) -> String {
    format!("{}.log", title.replace(['/', '\\'], "_"))
}

/// A host the operator can add to the console
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Chain specification, e.g. `bastion/db-1:2222`
    pub chain: String,

    /// Pane/log title (defaults to the chain string)
    #[serde(default)]
    pub title: Option<String>,

    /// Tags for selecting groups of hosts
    #[serde(default)]
    pub tags: Vec<String>,
}

impl HostEntry {
    /// Create an entry with just a chain
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            ..Default::default()
        }
    }

    /// Title used for the pane and log file
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.chain)
    }

    /// Parse the chain
    pub fn chain_spec(&self) -> Result<ChainSpec, ConfigError> {
        ChainSpec::parse(&self.chain)
    }

    /// Transcript file name for this entry's session
    pub fn log_file_name(&self) -> String {
        log_file_name(self.title())
    }

    /// Check if the host has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
