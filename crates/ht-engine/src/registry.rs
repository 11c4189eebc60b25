//! Live set of sessions, keyed by title

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;

use ht_core::error::{HtError, SessionError};
use ht_core::traits::{Layout, Transport};
use ht_core::types::{ChainSpec, TerminalSize};

use crate::connection::ConnectionManager;
use crate::session::{RunOutcome, Session, SessionLog};

/// Registry membership, guarded as one unit
struct Members<T: Transport> {
    sessions: HashMap<String, Arc<Session<T>>>,
    /// Layout order (insertion order)
    order: Vec<String>,
    /// Titles being added or torn down; not visible, but not free either
    pending: HashSet<String>,
}

impl<T: Transport> Default for Members<T> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            pending: HashSet::new(),
        }
    }
}

/// Tracks the connected sessions and keeps the layout in step with them.
///
/// Every title in the registry maps to a connected session. Membership
/// changes and the matching `reflow` call happen under one write lock, so
/// the layout never sees a stale host set.
pub struct HostRegistry<T: Transport> {
    connections: Arc<ConnectionManager<T>>,
    layout: Arc<dyn Layout>,
    log_dir: PathBuf,
    default_size: TerminalSize,
    members: RwLock<Members<T>>,
}

/// Holds a title in `pending` until dropped or disarmed
struct Reservation<'a, T: Transport> {
    registry: &'a HostRegistry<T>,
    title: String,
    armed: bool,
}

impl<'a, T: Transport> Reservation<'a, T> {
    fn new(registry: &'a HostRegistry<T>, title: &str) -> Self {
        Self {
            registry,
            title: title.to_string(),
            armed: true,
        }
    }

    /// The caller already cleared `pending` under the members lock
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Transport> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.members.write().pending.remove(&self.title);
        }
    }
}

impl<T: Transport> HostRegistry<T> {
    pub fn new(
        connections: Arc<ConnectionManager<T>>,
        layout: Arc<dyn Layout>,
        log_dir: impl Into<PathBuf>,
        default_size: TerminalSize,
    ) -> Self {
        Self {
            connections,
            layout,
            log_dir: log_dir.into(),
            default_size,
            members: RwLock::new(Members::default()),
        }
    }

    /// Shared connection manager
    pub fn connections(&self) -> &Arc<ConnectionManager<T>> {
        &self.connections
    }

    /// Connect `chain` as a new session called `title`.
    ///
    /// A title that is registered (or mid-add/remove) is rejected without
    /// touching the registry, as is one whose log file name is held by
    /// another live title (`a/b` and `a_b` both log to `a_b.log`). On connection failure nothing is registered
    /// and the pane is closed again.
    pub async fn add_host(&self, chain: &str, title: &str) -> Result<Arc<Session<T>>, HtError> {
        let chain = ChainSpec::parse(chain)?;
        let reservation = self.reserve(title)?;

        let pane = self.layout.open_pane(title);
        let session = match Session::create(
            title,
            chain,
            Arc::clone(&self.connections),
            pane,
            &self.log_dir,
            self.default_size,
        )
        .await
        {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.layout.close_pane(title);
                return Err(e.into());
            }
        };

        if let Err(e) = session.connect().await {
            tracing::warn!("Failed to add {}: {}", title, e);
            if let Err(close_err) = session.close().await {
                tracing::debug!("Closing failed session {}: {}", title, close_err);
            }
            self.layout.close_pane(title);
            return Err(e);
        }

        {
            let mut members = self.members.write();
            members.pending.remove(title);
            members.sessions.insert(title.to_string(), Arc::clone(&session));
            members.order.push(title.to_string());
            self.layout.reflow(&members.order);
        }
        reservation.disarm();

        tracing::info!("Added host {} ({})", title, session.chain());
        Ok(session)
    }

    /// Cancel, detach and close the session called `title`; no-op if absent.
    ///
    /// The entry leaves the registry (and the layout) first, atomically.
    /// The title stays reserved until the log is closed, so an immediate
    /// re-add cannot collide with the old log file.
    pub async fn remove_host(&self, title: &str) -> Result<(), SessionError> {
        let session = {
            let mut members = self.members.write();
            let Some(session) = members.sessions.remove(title) else {
                return Ok(());
            };
            members.order.retain(|t| t != title);
            members.pending.insert(title.to_string());
            self.layout.reflow(&members.order);
            session
        };
        let _reservation = Reservation::new(self, title);

        self.layout.close_pane(title);
        session.close().await?;

        tracing::info!("Removed host {}", title);
        Ok(())
    }

    /// Registered sessions in layout order
    pub fn list_hosts(&self) -> Vec<Arc<Session<T>>> {
        let members = self.members.read();
        members
            .order
            .iter()
            .filter_map(|title| members.sessions.get(title).cloned())
            .collect()
    }

    /// Registered titles in layout order
    pub fn titles(&self) -> Vec<String> {
        self.members.read().order.clone()
    }

    pub fn get_host(&self, title: &str) -> Option<Arc<Session<T>>> {
        self.members.read().sessions.get(title).cloned()
    }

    pub fn len(&self) -> usize {
        self.members.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `command` on every session at once; results are in layout order
    pub async fn run_all(&self, command: &str) -> Vec<(String, Result<RunOutcome, SessionError>)> {
        let sessions = self.list_hosts();
        tracing::info!("Running on {} hosts: {}", sessions.len(), command);

        join_all(sessions.iter().map(|session| async move {
            let result = session.run(command, None).await;
            (session.title().to_string(), result)
        }))
        .await
    }

    /// Cancel every in-flight run, waiting for all of them to stop
    pub async fn cancel_all(&self) {
        let sessions = self.list_hosts();
        join_all(sessions.iter().map(|session| session.cancel())).await;
    }

    /// Remove every host, in layout order
    pub async fn remove_all(&self) {
        for title in self.titles() {
            if let Err(e) = self.remove_host(&title).await {
                tracing::warn!("Failed to remove {}: {}", title, e);
            }
        }
    }

    /// Claim `title` and its log file name, both of which must be free
    fn reserve(&self, title: &str) -> Result<Reservation<'_, T>, SessionError> {
        let mut members = self.members.write();
        if members.sessions.contains_key(title) || members.pending.contains(title) {
            return Err(SessionError::AlreadyExists(title.to_string()));
        }

        let file = SessionLog::file_name_for(title);
        let holder = members
            .sessions
            .keys()
            .chain(members.pending.iter())
            .find(|other| SessionLog::file_name_for(other) == file)
            .cloned();
        if let Some(holder) = holder {
            return Err(SessionError::LogInUse {
                title: title.to_string(),
                holder,
                file,
            });
        }

        members.pending.insert(title.to_string());
        Ok(Reservation::new(self, title))
    }
}
