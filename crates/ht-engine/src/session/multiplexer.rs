//! Output fan-out

use std::io;
use std::sync::Arc;

use ht_core::traits::{Pane, Sink};

use super::log::SessionLog;

/// Writes every chunk of a session's stream, unchanged, to the live pane,
/// the session log and an optional extra sink.
///
/// The live pane is the primary sink: its failure is the mux's failure.
/// Log and extra-sink failures are logged and do not stop delivery to the
/// others. The mux does not own any sink's lifetime.
pub struct OutputMux {
    live: Arc<dyn Pane>,
    log: Arc<SessionLog>,
    extra: Option<Arc<dyn Sink>>,
}

impl OutputMux {
    pub fn new(live: Arc<dyn Pane>, log: Arc<SessionLog>, extra: Option<Arc<dyn Sink>>) -> Self {
        Self { live, log, extra }
    }

    /// Deliver `data` to every sink; returns the byte count on success
    pub async fn write(&self, data: &[u8]) -> io::Result<usize> {
        let live = self.live.write(data);

        if let Err(e) = self.log.write(data).await {
            tracing::warn!("Session log write to {:?} failed: {}", self.log.path(), e);
        }

        if let Some(extra) = &self.extra {
            if let Err(e) = extra.write(data) {
                tracing::debug!("Capture sink write failed: {}", e);
            }
        }

        live.map(|()| data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CaptureBuffer;
    use ht_core::types::TerminalSize;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPane {
        data: Mutex<Vec<u8>>,
        broken: bool,
    }

    impl Sink for RecordingPane {
        fn write(&self, data: &[u8]) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::Other, "pane gone"));
            }
            self.data.lock().extend_from_slice(data);
            Ok(())
        }
    }

    impl Pane for RecordingPane {
        fn geometry(&self) -> Option<TerminalSize> {
            None
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn write(&self, _data: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[tokio::test]
    async fn test_all_sinks_receive_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(SessionLog::create(dir.path(), "web").await.unwrap());
        let pane = Arc::new(RecordingPane::default());
        let capture = CaptureBuffer::new();

        let mux = OutputMux::new(pane.clone(), log.clone(), Some(Arc::new(capture.clone())));

        let chunks: [&[u8]; 3] = [b"\x1b[31merr\x1b[0m ", b"\x1b[2J\x1b[H", b"done\r\n"];
        for chunk in chunks {
            assert_eq!(mux.write(chunk).await.unwrap(), chunk.len());
        }
        log.close().await.unwrap();

        let expected = chunks.concat();
        assert_eq!(*pane.data.lock(), expected);
        assert_eq!(capture.bytes(), expected);
        assert_eq!(std::fs::read(log.path()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_extra_sink_failure_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(SessionLog::create(dir.path(), "db").await.unwrap());
        let pane = Arc::new(RecordingPane::default());

        let mux = OutputMux::new(pane.clone(), log.clone(), Some(Arc::new(FailingSink)));
        assert_eq!(mux.write(b"hello").await.unwrap(), 5);
        log.flush().await.unwrap();

        assert_eq!(*pane.data.lock(), b"hello".to_vec());
        assert_eq!(std::fs::read(log.path()).unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_live_failure_is_reported_but_log_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(SessionLog::create(dir.path(), "app").await.unwrap());
        let pane = Arc::new(RecordingPane {
            broken: true,
            ..Default::default()
        });

        let mux = OutputMux::new(pane, log.clone(), None);
        assert!(mux.write(b"lost").await.is_err());
        log.flush().await.unwrap();

        assert_eq!(std::fs::read(log.path()).unwrap(), b"lost".to_vec());
    }
}
