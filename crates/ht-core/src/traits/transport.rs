//! Transport traits
//!
//! The engine never speaks SSH itself. A [`Transport`] dials hops and
//! tunnels through them; the [`RemoteClient`]s it returns run commands.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{ConnectionError, SessionError};
use crate::types::{HopAddress, TerminalSize};

/// Merged stdout/stderr of one remote command, raw bytes including control sequences
pub type OutputStream = BoxStream<'static, std::io::Result<Bytes>>;

/// An authenticated client for one hop
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// The hop this client is authenticated to
    fn hop(&self) -> &HopAddress;

    /// Open a command session, allocate a pty of `size`, start `command`,
    /// and return its merged output stream.
    ///
    /// Dropping the stream stops local consumption only; the remote
    /// process is not signalled.
    async fn exec(&self, command: &str, size: TerminalSize) -> Result<OutputStream, SessionError>;

    /// Tear down the underlying connection
    async fn disconnect(&self);
}

/// Supplies authenticated clients, directly or through a previous hop
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The client type produced by this transport
    type Client: RemoteClient;

    /// Open a direct network connection to `hop` and authenticate
    async fn dial(&self, hop: &HopAddress) -> Result<Self::Client, ConnectionError>;

    /// Ask `via` to open a tunneled connection to `hop`, then authenticate over it
    async fn tunnel(
        &self,
        via: &Self::Client,
        hop: &HopAddress,
    ) -> Result<Self::Client, ConnectionError>;
}
