//! Sessions and their output plumbing

mod capture;
mod log;
mod multiplexer;
#[allow(clippy::module_inception)]
mod session;

pub use capture::{CaptureBuffer, ChannelSink};
pub use log::SessionLog;
pub use multiplexer::OutputMux;
pub use session::{RunOutcome, Session, SessionState};
