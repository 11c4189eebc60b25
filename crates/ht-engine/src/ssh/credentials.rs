//! Credential discovery and authentication

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{Handle, Handler};
use russh_keys::key::KeyPair;

use ht_core::error::{ConfigError, ConnectionError};

/// One way of proving identity to a hop
#[derive(Clone)]
pub enum AuthMethod {
    /// A private key loaded from disk
    Key { path: PathBuf, key: Arc<KeyPair> },
    /// Keys held by a running agent
    Agent { socket: PathBuf },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Key { path, .. } => f.debug_struct("Key").field("path", path).finish(),
            AuthMethod::Agent { socket } => {
                f.debug_struct("Agent").field("socket", socket).finish()
            }
        }
    }
}

/// Ordered authentication methods: every usable `id_*` key, then the agent
#[derive(Debug, Clone)]
pub struct Credentials {
    methods: Vec<AuthMethod>,
}

impl Credentials {
    /// Load every key in `ssh_dir` and append the agent if one is configured.
    ///
    /// Keys that cannot be loaded (passphrase-protected, unsupported, ...) are
    /// skipped. Finding nothing at all is an error.
    pub fn discover(ssh_dir: &Path, agent_socket: Option<&Path>) -> Result<Self, ConfigError> {
        let mut methods = Vec::new();

        for path in Self::candidate_key_files(ssh_dir) {
            match russh_keys::load_secret_key(&path, None) {
                Ok(key) => {
                    tracing::debug!("Loaded private key {:?}", path);
                    methods.push(AuthMethod::Key {
                        path,
                        key: Arc::new(key),
                    });
                }
                Err(e) => tracing::debug!("Skipping key {:?}: {}", path, e),
            }
        }

        if let Some(socket) = agent_socket {
            tracing::debug!("Using agent at {:?}", socket);
            methods.push(AuthMethod::Agent {
                socket: socket.to_path_buf(),
            });
        }

        if methods.is_empty() {
            return Err(ConfigError::NoCredentials(ssh_dir.to_path_buf()));
        }

        Ok(Self { methods })
    }

    /// Regular files in `ssh_dir` named `id_*` and not ending in `.pub`, sorted
    pub fn candidate_key_files(ssh_dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(ssh_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot read {:?}: {}", ssh_dir, e);
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with("id_") && !name.ends_with(".pub")
            })
            .map(|entry| entry.path())
            .collect();
        files.sort();
        files
    }

    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Try each method in order until the server accepts one
    pub async fn authenticate<H: Handler>(
        &self,
        handle: &mut Handle<H>,
        user: &str,
        address: &str,
    ) -> Result<(), ConnectionError> {
        for method in &self.methods {
            let accepted = match method {
                AuthMethod::Key { path, key } => {
                    tracing::debug!("Offering {:?} as {} to {}", path, user, address);
                    handle
                        .authenticate_publickey(user, Arc::clone(key))
                        .await
                        .map_err(|e| ConnectionError::Handshake {
                            address: address.to_string(),
                            reason: e.to_string(),
                        })?
                }
                AuthMethod::Agent { socket } => {
                    authenticate_with_agent(handle, user, socket).await
                }
            };

            if accepted {
                tracing::debug!("Authenticated as {} to {}", user, address);
                return Ok(());
            }
        }

        Err(ConnectionError::AuthenticationFailed {
            user: user.to_string(),
            address: address.to_string(),
        })
    }
}

#[cfg(unix)]
async fn authenticate_with_agent<H: Handler>(
    handle: &mut Handle<H>,
    user: &str,
    socket: &Path,
) -> bool {
    use russh_keys::agent::client::AgentClient;

    let mut agent = match AgentClient::connect_uds(socket).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!("Agent at {:?} unavailable: {}", socket, e);
            return false;
        }
    };

    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            tracing::debug!("Agent refused to list identities: {}", e);
            return false;
        }
    };

    for key in identities {
        let fingerprint = key.fingerprint();
        let (returned, result) = handle.authenticate_future(user, key, agent).await;
        agent = returned;
        match result {
            Ok(true) => return true,
            Ok(false) => tracing::debug!("Agent key {} not accepted", fingerprint),
            Err(e) => tracing::debug!("Agent signing with {} failed: {:?}", fingerprint, e),
        }
    }

    false
}

#[cfg(not(unix))]
async fn authenticate_with_agent<H: Handler>(
    _handle: &mut Handle<H>,
    _user: &str,
    socket: &Path,
) -> bool {
    tracing::debug!("Agent authentication via {:?} is not supported on this platform", socket);
    false
}
