//! Caller-supplied sinks for programmatic command results

use std::io;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::mpsc;

use ht_core::traits::Sink;

static ESCAPE_SEQUENCE: OnceLock<regex::bytes::Regex> = OnceLock::new();

/// Terminal escape sequences: CSI, OSC, DCS/SOS/PM/APC strings, and
/// two-byte or charset-selecting ESC sequences. Plain control bytes such as
/// `\t` and `\r` are not matched.
fn escape_sequence() -> &'static regex::bytes::Regex {
    ESCAPE_SEQUENCE.get_or_init(|| {
        regex::bytes::Regex::new(
            r"(?-u)\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[PX^_][^\x1b]*\x1b\\|[ -/]*[0-~])",
        )
        .expect("Failed to compile escape sequence regex")
    })
}

/// In-memory copy of a run's output, for inspection after the run
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw captured bytes, control sequences included
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// Captured bytes as (lossy) UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    /// Captured text with terminal escape sequences removed; tabs, carriage
    /// returns and every other byte are kept
    pub fn plain_text(&self) -> String {
        let raw = self.inner.lock();
        let stripped = escape_sequence().replace_all(&raw, &b""[..]);
        String::from_utf8_lossy(&stripped).into_owned()
    }

    /// Every match of `regex` in the plain text; each entry holds the whole
    /// match followed by its capture groups (empty string for groups that
    /// did not participate).
    pub fn matches(&self, regex: &Regex) -> Vec<Vec<String>> {
        let text = self.plain_text();
        regex
            .captures_iter(&text)
            .map(|caps| {
                caps.iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Sink for CaptureBuffer {
    fn write(&self, data: &[u8]) -> io::Result<()> {
        self.inner.lock().extend_from_slice(data);
        Ok(())
    }
}

/// Forwards output chunks to a receiver while the run is in progress
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    /// Create the sink and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn write(&self, data: &[u8]) -> io::Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "stream receiver dropped"))
    }
}
