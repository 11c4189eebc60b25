//! Per-host command execution context

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::{mpsc, watch, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ht_core::error::{HtError, SessionError};
use ht_core::traits::{Pane, RemoteClient, Sink, Transport};
use ht_core::types::{ChainSpec, TerminalSize};

use super::capture::{CaptureBuffer, ChannelSink};
use super::log::SessionLog;
use super::multiplexer::OutputMux;
use crate::connection::ConnectionManager;

/// Coarse session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No command in flight
    Idle,
    /// A command is streaming
    Running,
    /// Torn down; every operation fails
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Result of one completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Bytes delivered to the live pane
    pub bytes: u64,
    /// The copy loop stopped because of `cancel`
    pub cancelled: bool,
}

/// Handle to the run currently holding the exec slot
struct ActiveRun {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Releases a run's resources on every exit path, panics included.
///
/// Order matters: the active slot is cleared and the exec lock released
/// before `done` is signalled, so a returning `cancel` always finds the
/// session quiescent.
struct RunGuard {
    active: Arc<Mutex<Option<ActiveRun>>>,
    cancel: CancellationToken,
    exec: Option<OwnedMutexGuard<()>>,
    done: watch::Sender<bool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.lock().take();
        self.cancel.cancel();
        drop(self.exec.take());
        self.done.send_replace(true);
    }
}

/// One logical remote endpoint: the leaf client of a resolved chain plus
/// its pane, its log, and a single exec slot.
///
/// Commands on one session are strictly serialized. Each run executes on
/// its own tokio task, so sessions run in parallel and a panicking run is
/// reported as [`SessionError::Panicked`] without affecting anyone else.
pub struct Session<T: Transport> {
    title: String,
    chain: ChainSpec,
    connections: Arc<ConnectionManager<T>>,
    client: Mutex<Option<Arc<T::Client>>>,
    pane: Arc<dyn Pane>,
    log: Arc<SessionLog>,
    default_size: TerminalSize,
    /// Held by a run for its entire duration
    exec: Arc<tokio::sync::Mutex<()>>,
    /// Present iff a run is registered; `closed` is only flipped under this lock
    active: Arc<Mutex<Option<ActiveRun>>>,
    closed: AtomicBool,
}

impl<T: Transport> Session<T> {
    /// Create an unconnected session, opening (and truncating) its log in `log_dir`
    pub async fn create(
        title: impl Into<String>,
        chain: ChainSpec,
        connections: Arc<ConnectionManager<T>>,
        pane: Arc<dyn Pane>,
        log_dir: &Path,
        default_size: TerminalSize,
    ) -> Result<Self, SessionError> {
        let title = title.into();
        let log = SessionLog::create(log_dir, &title).await?;

        Ok(Self {
            title,
            chain,
            connections,
            client: Mutex::new(None),
            pane,
            log: Arc::new(log),
            default_size,
            exec: Arc::new(tokio::sync::Mutex::new(())),
            active: Arc::new(Mutex::new(None)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn chain(&self) -> &ChainSpec {
        &self.chain
    }

    pub fn pane(&self) -> &Arc<dyn Pane> {
        &self.pane
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn is_connected(&self) -> bool {
        self.client.lock().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        let active = self.active.lock();
        if self.is_closed() {
            SessionState::Closed
        } else if active.is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    /// Resolve the chain and bind its leaf client.
    ///
    /// Failure leaves the session unconnected; it can be retried.
    pub async fn connect(&self) -> Result<(), HtError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.title.clone()).into());
        }

        let client = self.connections.resolve(&self.chain).await?;
        tracing::info!("Session {} connected to {}", self.title, self.chain);
        *self.client.lock() = Some(client);
        Ok(())
    }

    /// Run `command` to completion, streaming its output to the pane, the
    /// log and `extra`.
    ///
    /// Waits for any run already in flight on this session first. Returns
    /// early (with `cancelled` set) when [`Session::cancel`] is called.
    pub async fn run(
        &self,
        command: &str,
        extra: Option<Arc<dyn Sink>>,
    ) -> Result<RunOutcome, SessionError> {
        let client = self.leaf_client()?;
        let exec = Arc::clone(&self.exec).lock_owned().await;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut active = self.active.lock();
            if self.is_closed() {
                return Err(SessionError::Closed(self.title.clone()));
            }
            *active = Some(ActiveRun {
                cancel: cancel.clone(),
                done: done_rx,
            });
        }
        let guard = RunGuard {
            active: Arc::clone(&self.active),
            cancel: cancel.clone(),
            exec: Some(exec),
            done: done_tx,
        };

        let size = self.pane.geometry().unwrap_or(self.default_size);
        let mux = OutputMux::new(Arc::clone(&self.pane), Arc::clone(&self.log), extra);
        let log = Arc::clone(&self.log);
        let command = command.to_string();
        let title = self.title.clone();

        tracing::info!("Running on {} ({}): {}", self.title, size, command);

        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = stream_command(client.as_ref(), &command, size, &mux, &cancel).await;
            if let Err(e) = log.flush().await {
                tracing::warn!("Failed to flush log for {}: {}", title, e);
            }
            match &result {
                Ok(outcome) => tracing::info!(
                    "Run on {} finished: {} bytes{}",
                    title,
                    outcome.bytes,
                    if outcome.cancelled { " (cancelled)" } else { "" }
                ),
                Err(e) => tracing::warn!("Run on {} failed: {}", title, e),
            }
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                tracing::error!("Run on {} panicked: {}", self.title, message);
                Err(SessionError::Panicked {
                    title: self.title.clone(),
                    message,
                })
            }
        }
    }

    /// Stop the run in flight, if any, and wait until it has left its copy
    /// loop and released the exec slot.
    ///
    /// Only local streaming stops; the remote process keeps running until
    /// it finishes on its own or the connection is torn down.
    pub async fn cancel(&self) {
        let active = self
            .active
            .lock()
            .as_ref()
            .map(|run| (run.cancel.clone(), run.done.clone()));

        let Some((cancel, mut done)) = active else {
            return;
        };

        tracing::debug!("Cancelling run on {}", self.title);
        cancel.cancel();
        // sender dropped means the run is gone as well
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Cancel any run, then release the leaf client and close the log.
    ///
    /// Terminal: later runs fail with [`SessionError::Closed`]. Calling it
    /// again is a no-op.
    pub async fn close(&self) -> Result<(), SessionError> {
        {
            let _active = self.active.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
        }

        self.cancel().await;
        self.client.lock().take();
        self.log.close().await?;

        tracing::info!("Session {} closed", self.title);
        Ok(())
    }

    /// Run `command` and return everything it printed
    pub async fn run_capture(&self, command: &str) -> Result<CaptureBuffer, SessionError> {
        let capture = CaptureBuffer::new();
        self.run(command, Some(Arc::new(capture.clone()))).await?;
        Ok(capture)
    }

    /// Run `command` and return every match of `regex` in its output, with
    /// terminal control sequences stripped first
    pub async fn run_matching(
        &self,
        command: &str,
        regex: &Regex,
    ) -> Result<Vec<Vec<String>>, SessionError> {
        let capture = self.run_capture(command).await?;
        Ok(capture.matches(regex))
    }

    /// Run `command` in the background, receiving its output chunks as they
    /// arrive. The channel closes when the run ends.
    pub fn run_streaming(
        self: &Arc<Self>,
        command: &str,
    ) -> (
        mpsc::UnboundedReceiver<Bytes>,
        JoinHandle<Result<RunOutcome, SessionError>>,
    ) {
        let (sink, rx) = ChannelSink::new();
        let session = Arc::clone(self);
        let command = command.to_string();
        let handle =
            tokio::spawn(async move { session.run(&command, Some(Arc::new(sink))).await });
        (rx, handle)
    }

    fn leaf_client(&self) -> Result<Arc<T::Client>, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.title.clone()));
        }
        self.client
            .lock()
            .clone()
            .ok_or_else(|| SessionError::NotConnected(self.title.clone()))
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("title", &self.title)
            .field("chain", &self.chain.to_string())
            .field("state", &self.state())
            .finish()
    }
}

/// Copy one command's output through `mux` until it ends or `cancel` fires.
///
/// Cancellation is observed between reads only; a read in progress is never
/// interrupted. Stream and live-sink errors end the loop like end-of-stream.
async fn stream_command<C: RemoteClient>(
    client: &C,
    command: &str,
    size: TerminalSize,
    mux: &OutputMux,
    cancel: &CancellationToken,
) -> Result<RunOutcome, SessionError> {
    let mut stream = client.exec(command, size).await?;
    let mut bytes = 0u64;

    while !cancel.is_cancelled() {
        let next = stream.next().await;
        if cancel.is_cancelled() {
            break;
        }

        match next {
            Some(Ok(chunk)) if chunk.is_empty() => {
                tracing::debug!("Empty read, ending stream");
                return Ok(RunOutcome { bytes, cancelled: false });
            }
            Some(Ok(chunk)) => match mux.write(&chunk).await {
                Ok(n) => bytes += n as u64,
                Err(e) => {
                    tracing::debug!("Live pane write failed, ending stream: {}", e);
                    return Ok(RunOutcome { bytes, cancelled: false });
                }
            },
            Some(Err(e)) => {
                tracing::debug!("Read failed, ending stream: {}", e);
                return Ok(RunOutcome { bytes, cancelled: false });
            }
            None => return Ok(RunOutcome { bytes, cancelled: false }),
        }
    }

    tracing::debug!("Cancellation observed after {} bytes", bytes);
    Ok(RunOutcome {
        bytes,
        cancelled: true,
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
