//! Live-view collaborator traits
//!
//! Rendering, window layout and reflow geometry live outside the engine.
//! The engine only needs somewhere to write bytes, a geometry query to size
//! ptys, and a hook to call when the set of hosts changes.

use std::sync::Arc;

use crate::types::TerminalSize;

/// A byte sink receiving a session's raw output stream
pub trait Sink: Send + Sync {
    /// Write all of `data`
    fn write(&self, data: &[u8]) -> std::io::Result<()>;
}

/// The live view of one session
pub trait Pane: Sink {
    /// Current inner geometry, if the display can report one.
    ///
    /// Implementations must synchronize with concurrent display mutation;
    /// callers treat this as a short blocking query.
    fn geometry(&self) -> Option<TerminalSize>;
}

/// Arranges panes and is told whenever registry membership changes
pub trait Layout: Send + Sync {
    /// Create the pane for a new session
    fn open_pane(&self, title: &str) -> Arc<dyn Pane>;

    /// Hide/destroy the pane of a removed session
    fn close_pane(&self, title: &str);

    /// Membership changed; `titles` is the complete new set in layout order
    fn reflow(&self, titles: &[String]);
}
