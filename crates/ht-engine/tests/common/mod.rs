//! Scripted transport and display doubles shared by the engine tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;

use ht_core::error::{ConnectionError, SessionError};
use ht_core::traits::{Layout, OutputStream, Pane, RemoteClient, Sink, Transport};
use ht_core::types::{ChainSpec, HopAddress, TerminalSize};
use ht_engine::{ConnectionManager, Session};

/// Shared, inspectable state of a [`MockTransport`]
#[derive(Debug, Default)]
pub struct MockState {
    events: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

impl MockState {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn events_starting_with(&self, prefix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Transport double: records every dial/tunnel, fails hosts on request,
/// and hands out clients that run a small command script.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make dials and tunnels to `host` fail
    pub fn fail_host(&self, host: &str) {
        self.state.failing.lock().insert(host.to_string());
    }

    pub fn heal_host(&self, host: &str) {
        self.state.failing.lock().remove(host);
    }

    /// Delay every dial and tunnel
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    async fn connect(&self, hop: &HopAddress) -> Result<MockClient, ConnectionError> {
        let delay = *self.state.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.failing.lock().contains(&hop.host) {
            return Err(ConnectionError::Dial {
                address: hop.socket_address(),
                reason: "connection refused".to_string(),
            });
        }

        Ok(MockClient {
            hop: hop.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Client = MockClient;

    async fn dial(&self, hop: &HopAddress) -> Result<MockClient, ConnectionError> {
        self.state.record(format!("dial {}", hop));
        self.connect(hop).await
    }

    async fn tunnel(&self, via: &MockClient, hop: &HopAddress) -> Result<MockClient, ConnectionError> {
        self.state.record(format!("tunnel {} via {}", hop, via.hop));
        self.connect(hop).await
    }
}

/// Client double. Commands:
///
/// - `echo TEXT`: prints `TEXT\r\n`
/// - `color`: prints text wrapped in SGR and erase sequences
/// - `slow MS TEXT`: waits `MS` milliseconds, then prints `TEXT\r\n`
/// - `stream`: prints `tick N\r\n` every 5 ms, forever
/// - `hang`: never produces anything
/// - `hostname`: prints the hop's host name
/// - `fail`: the command cannot be started
/// - `panic`: panics inside exec
/// - `empty-read` / `error-read`: prints `a`, then an empty chunk or a read
///   error, then `b`
/// - `ifconfig`: prints interface lines for pattern tests
/// - `table`: prints tab-separated, colored columns
///
/// Hosts whose name starts with `noexec` refuse every command.
#[derive(Debug)]
pub struct MockClient {
    hop: HopAddress,
    state: Arc<MockState>,
}

type Step = (Duration, io::Result<Bytes>);

fn text(s: &str) -> Step {
    (Duration::ZERO, Ok(Bytes::from(s.to_string())))
}

fn scripted(state: Arc<MockState>, label: String, steps: Vec<Step>) -> OutputStream {
    futures::stream::unfold(
        (steps.into_iter(), state, label),
        |(mut steps, state, label)| async move {
            match steps.next() {
                Some((delay, item)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((item, (steps, state, label)))
                }
                None => {
                    state.record(format!("end {}", label));
                    None
                }
            }
        },
    )
    .boxed()
}

#[async_trait]
impl RemoteClient for MockClient {
    fn hop(&self) -> &HopAddress {
        &self.hop
    }

    async fn exec(&self, command: &str, size: TerminalSize) -> Result<OutputStream, SessionError> {
        self.state
            .record(format!("exec {} on {} at {}", command, self.hop, size));

        if self.hop.host.starts_with("noexec") {
            return Err(SessionError::Exec(format!("{}: refused", self.hop)));
        }

        let label = format!("{} on {}", command, self.hop);
        let state = Arc::clone(&self.state);
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));

        let stream = match verb {
            "echo" => scripted(state, label, vec![text(&format!("{}\r\n", rest))]),
            "color" => scripted(
                state,
                label,
                vec![
                    text("\x1b[31mred\x1b[0m "),
                    text("\x1b[1;32mgreen\x1b[0m\r\n"),
                    text("\x1b[2K\rdone\r\n"),
                ],
            ),
            "slow" => {
                let (ms, msg) = rest.split_once(' ').unwrap_or((rest, ""));
                let ms: u64 = ms.parse().unwrap_or(0);
                scripted(
                    state,
                    label,
                    vec![(
                        Duration::from_millis(ms),
                        Ok(Bytes::from(format!("{}\r\n", msg))),
                    )],
                )
            }
            "stream" => futures::stream::unfold(0u64, |n| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some((Ok(Bytes::from(format!("tick {}\r\n", n))), n + 1))
            })
            .boxed(),
            "hang" => futures::stream::pending::<io::Result<Bytes>>().boxed(),
            "hostname" => scripted(state, label, vec![text(&format!("{}\r\n", self.hop.host))]),
            "fail" => return Err(SessionError::Exec(format!("{}: no such command", self.hop))),
            "panic" => panic!("scripted panic on {}", self.hop),
            "empty-read" => scripted(
                state,
                label,
                vec![text("a"), (Duration::ZERO, Ok(Bytes::new())), text("b")],
            ),
            "error-read" => scripted(
                state,
                label,
                vec![
                    text("a"),
                    (
                        Duration::ZERO,
                        Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                    ),
                    text("b"),
                ],
            ),
            "ifconfig" => scripted(
                state,
                label,
                vec![
                    text("\x1b[1meth0\x1b[0m: inet 10.0.0.5\r\n"),
                    text("\x1b[1meth1\x1b[0m: inet 10.0.1.7\r\n"),
                    text("lo: inet 127.0.0.1\r\n"),
                ],
            ),
            "table" => scripted(
                state,
                label,
                vec![
                    text("IFACE\tADDR\r\n"),
                    text("\x1b[32meth0\x1b[0m\t10.0.0.5\r\n"),
                    text("eth1\t10.0.1.7\r\n"),
                ],
            ),
            _ => scripted(state, label, vec![text("unknown command\r\n")]),
        };

        Ok(stream)
    }

    async fn disconnect(&self) {
        self.state.record(format!("disconnect {}", self.hop));
    }
}

/// Pane double that records everything written to it
#[derive(Default)]
pub struct RecordingPane {
    data: Mutex<Vec<u8>>,
    geometry: Mutex<Option<TerminalSize>>,
}

impl RecordingPane {
    pub fn with_geometry(size: TerminalSize) -> Self {
        Self {
            data: Mutex::default(),
            geometry: Mutex::new(Some(size)),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }
}

impl Sink for RecordingPane {
    fn write(&self, data: &[u8]) -> io::Result<()> {
        self.data.lock().extend_from_slice(data);
        Ok(())
    }
}

impl Pane for RecordingPane {
    fn geometry(&self) -> Option<TerminalSize> {
        *self.geometry.lock()
    }
}

/// Layout double: one recording pane per title, every reflow remembered
#[derive(Default)]
pub struct RecordingLayout {
    panes: Mutex<HashMap<String, Arc<RecordingPane>>>,
    closed: Mutex<Vec<String>>,
    reflows: Mutex<Vec<Vec<String>>>,
}

impl RecordingLayout {
    pub fn pane(&self, title: &str) -> Option<Arc<RecordingPane>> {
        self.panes.lock().get(title).cloned()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().clone()
    }

    pub fn reflows(&self) -> Vec<Vec<String>> {
        self.reflows.lock().clone()
    }

    pub fn last_reflow(&self) -> Option<Vec<String>> {
        self.reflows.lock().last().cloned()
    }
}

impl Layout for RecordingLayout {
    fn open_pane(&self, title: &str) -> Arc<dyn Pane> {
        let pane = Arc::new(RecordingPane::default());
        self.panes.lock().insert(title.to_string(), Arc::clone(&pane));
        pane
    }

    fn close_pane(&self, title: &str) {
        self.closed.lock().push(title.to_string());
    }

    fn reflow(&self, titles: &[String]) {
        self.reflows.lock().push(titles.to_vec());
    }
}

/// Create and connect a session over `transport`
pub async fn connected_session(
    connections: &Arc<ConnectionManager<MockTransport>>,
    title: &str,
    chain: &str,
    pane: Arc<RecordingPane>,
    log_dir: &Path,
) -> Arc<Session<MockTransport>> {
    let session = Session::create(
        title,
        ChainSpec::parse(chain).unwrap(),
        Arc::clone(connections),
        pane,
        log_dir,
        TerminalSize::default(),
    )
    .await
    .unwrap();
    session.connect().await.unwrap();
    Arc::new(session)
}

/// Poll until `pane` has received at least `min` bytes
pub async fn wait_for_output(pane: &RecordingPane, min: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pane.len() < min {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("pane never received output");
}
