//! Core error types for hopterm

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the hopterm ecosystem
#[derive(Error, Debug)]
pub enum HtError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Raw network connection could not be opened
    #[error("Failed to dial {address}: {reason}")]
    Dial { address: String, reason: String },

    /// SSH handshake failed over an established byte stream
    #[error("Handshake with {address} failed: {reason}")]
    Handshake { address: String, reason: String },

    /// The previous hop refused to open a tunnel to the next one
    #[error("Failed to open tunnel to {address}: {reason}")]
    Tunnel { address: String, reason: String },

    /// No authentication method was accepted
    #[error("Authentication failed for {user}@{address}")]
    AuthenticationFailed { user: String, address: String },

    /// Host key verification failed
    #[error("Host key verification failed for {address}: {reason}")]
    HostKeyRejected { address: String, reason: String },

    /// Dial + handshake did not complete in time
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// Chain or credential configuration was unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A hop in a chain failed; `prefix` names the chain up to that hop
    #[error("Hop {prefix} failed: {source}")]
    Hop {
        prefix: String,
        #[source]
        source: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// Wrap this error with the chain prefix of the hop that produced it
    pub fn at_hop(self, prefix: impl Into<String>) -> Self {
        ConnectionError::Hop {
            prefix: prefix.into(),
            source: Box::new(self),
        }
    }

    /// Prefix of the failing hop, if known
    pub fn failing_prefix(&self) -> Option<&str> {
        match self {
            ConnectionError::Hop { prefix, .. } => Some(prefix),
            _ => None,
        }
    }
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session has no resolved client yet
    #[error("Session {0} is not connected")]
    NotConnected(String),

    /// Session has been closed
    #[error("Session {0} is closed")]
    Closed(String),

    /// Session title already registered
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Another live session's title maps to the same log file
    #[error("Log file {file} for {title} is already used by {holder}")]
    LogInUse {
        title: String,
        holder: String,
        file: String,
    },

    /// Remote command session could not be opened
    #[error("Failed to open command session: {0}")]
    ChannelOpen(String),

    /// PTY allocation failed
    #[error("PTY allocation failed: {0}")]
    PtyRequest(String),

    /// Remote command could not be started
    #[error("Failed to start command: {0}")]
    Exec(String),

    /// The run panicked; the session itself stays usable
    #[error("Run on {title} panicked: {message}")]
    Panicked { title: String, message: String },

    /// Per-session log could not be opened or written
    #[error("Session log error: {0}")]
    Log(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Malformed chain specification
    #[error("Invalid chain specification: {0}")]
    InvalidChain(String),

    /// No usable authentication method was found
    #[error("No authentication method available (searched {0})")]
    NoCredentials(PathBuf),
}
