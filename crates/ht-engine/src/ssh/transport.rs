//! russh-backed transport: direct dials, direct-tcpip tunnels, pty exec

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect, Pty};

use ht_core::config::{ConsoleConfig, HostKeyPolicy};
use ht_core::error::{ConfigError, ConnectionError, SessionError};
use ht_core::traits::{OutputStream, RemoteClient, Transport};
use ht_core::types::{HopAddress, TerminalSize};

use super::credentials::Credentials;
use super::handler::{HopHandler, RejectionSlot};

/// Terminal modes requested with every pty: no local echo, 14400 baud
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

const PTY_TERM: &str = "xterm";

/// Dials hops over TCP or through a previous hop's `direct-tcpip` channel
pub struct SshTransport {
    config: Arc<Config>,
    credentials: Credentials,
    username: String,
    host_key_policy: HostKeyPolicy,
    known_hosts_path: PathBuf,
    connect_timeout: Duration,
}

impl SshTransport {
    pub fn new(console: &ConsoleConfig, credentials: Credentials) -> Self {
        let config = Config {
            keepalive_interval: Some(console.keepalive_interval),
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            credentials,
            username: console.username.clone(),
            host_key_policy: console.host_key_policy,
            known_hosts_path: console.known_hosts_path.clone(),
            connect_timeout: console.connect_timeout,
        }
    }

    /// Discover credentials as configured and build the transport
    pub fn from_config(console: &ConsoleConfig) -> Result<Self, ConfigError> {
        let agent = console.agent_socket();
        let credentials = Credentials::discover(&console.ssh_dir, agent.as_deref())?;
        Ok(Self::new(console, credentials))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn handler(&self, hop: &HopAddress) -> HopHandler {
        HopHandler::new(
            hop.clone(),
            self.host_key_policy,
            self.known_hosts_path.clone(),
        )
    }

    /// Authenticate a freshly handshaken connection
    async fn finish(
        &self,
        hop: &HopAddress,
        mut handle: Handle<HopHandler>,
    ) -> Result<SshClient, ConnectionError> {
        let user = hop.user_or(&self.username);
        self.credentials
            .authenticate(&mut handle, user, &hop.socket_address())
            .await?;

        Ok(SshClient {
            handle,
            hop: hop.clone(),
        })
    }
}

/// Map a failed connect into the connection error taxonomy
fn connect_error(hop: &HopAddress, err: anyhow::Error, rejection: &RejectionSlot) -> ConnectionError {
    let address = hop.socket_address();

    if let Some(reason) = rejection.lock().take() {
        return ConnectionError::HostKeyRejected { address, reason };
    }

    match err.downcast_ref::<russh::Error>() {
        Some(russh::Error::IO(e)) => ConnectionError::Dial {
            address,
            reason: e.to_string(),
        },
        Some(russh::Error::UnknownKey) => ConnectionError::HostKeyRejected {
            address,
            reason: "server key was not accepted".to_string(),
        },
        _ => ConnectionError::Handshake {
            address,
            reason: err.to_string(),
        },
    }
}

#[async_trait]
impl Transport for SshTransport {
    type Client = SshClient;

    async fn dial(&self, hop: &HopAddress) -> Result<SshClient, ConnectionError> {
        let address = hop.socket_address();
        let handler = self.handler(hop);
        let rejection = handler.rejection();

        tracing::debug!("Connecting to {}", address);
        let handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect(Arc::clone(&self.config), address.as_str(), handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(address.clone()))?
        .map_err(|e| connect_error(hop, e, &rejection))?;

        self.finish(hop, handle).await
    }

    async fn tunnel(&self, via: &SshClient, hop: &HopAddress) -> Result<SshClient, ConnectionError> {
        let address = hop.socket_address();

        let channel = via
            .handle
            .channel_open_direct_tcpip(hop.host.clone(), u32::from(hop.port), "127.0.0.1", 0)
            .await
            .map_err(|e| ConnectionError::Tunnel {
                address: address.clone(),
                reason: e.to_string(),
            })?;

        let handler = self.handler(hop);
        let rejection = handler.rejection();

        tracing::debug!("Handshaking with {} through {}", address, via.hop);
        let handle = tokio::time::timeout(
            self.connect_timeout,
            client::connect_stream(Arc::clone(&self.config), channel.into_stream(), handler),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(address.clone()))?
        .map_err(|e| connect_error(hop, e, &rejection))?;

        self.finish(hop, handle).await
    }
}

/// An authenticated russh connection to one hop
pub struct SshClient {
    handle: Handle<HopHandler>,
    hop: HopAddress,
}

#[async_trait]
impl RemoteClient for SshClient {
    fn hop(&self) -> &HopAddress {
        &self.hop
    }

    async fn exec(&self, command: &str, size: TerminalSize) -> Result<OutputStream, SessionError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::ChannelOpen(format!("{}: {}", self.hop, e)))?;

        channel
            .request_pty(
                true,
                PTY_TERM,
                u32::from(size.cols),
                u32::from(size.rows),
                0,
                0,
                PTY_MODES,
            )
            .await
            .map_err(|e| SessionError::PtyRequest(format!("{}: {}", self.hop, e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Exec(format!("{}: {}", self.hop, e)))?;

        // stdout and stderr interleaved in arrival order
        let stream = futures::stream::unfold(channel, |mut channel| async move {
            loop {
                match channel.wait().await? {
                    ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
                        return Some((Ok(Bytes::copy_from_slice(&data)), channel));
                    }
                    ChannelMsg::Failure => {
                        return Some((
                            Err(io::Error::new(io::ErrorKind::Other, "remote request failed")),
                            channel,
                        ));
                    }
                    ChannelMsg::Eof | ChannelMsg::Close => return None,
                    _ => continue,
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.hop, e);
        }
    }
}
