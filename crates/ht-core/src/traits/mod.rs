//! Core trait definitions

mod display;
mod transport;

pub use display::{Layout, Pane, Sink};
pub use transport::{OutputStream, RemoteClient, Transport};
