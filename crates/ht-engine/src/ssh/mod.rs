//! SSH transport provider built on russh

mod credentials;
mod handler;
pub mod host_keys;
mod transport;

pub use credentials::{AuthMethod, Credentials};
pub use host_keys::{HostKeyDecision, KnownHostLookup};
pub use transport::{SshClient, SshTransport};
