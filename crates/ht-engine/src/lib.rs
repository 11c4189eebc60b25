//! ht-engine: Session orchestration engine for hopterm
//!
//! Resolves jump-host chains into authenticated clients (reusing every
//! already-established prefix), runs one command at a time per session
//! with cooperative cancellation, and fans each session's raw output out
//! to its live pane, its log file and an optional capture sink.

pub mod connection;
pub mod registry;
pub mod session;
pub mod ssh;

pub use connection::ConnectionManager;
pub use registry::HostRegistry;
pub use session::{CaptureBuffer, ChannelSink, OutputMux, RunOutcome, Session, SessionLog, SessionState};
pub use ssh::{Credentials, SshClient, SshTransport};
