//! Per-session transcript file

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// Append-only transcript of everything a session streamed, control
/// sequences included. Created with the session, flushed after every run,
/// closed on teardown.
pub struct SessionLog {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl SessionLog {
    /// Create `<dir>/<title>.log`, replacing path separators in the title.
    ///
    /// An existing file is truncated. Titles that map to the same name must
    /// never be live at once; the registry enforces that.
    pub async fn create(dir: &Path, title: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(Self::file_name_for(title));
        let file = File::create(&path).await?;

        tracing::debug!("Opened session log {:?}", path);

        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// Log file name for a session title
    pub fn file_name_for(title: &str) -> String {
        ht_core::config::log_file_name(title)
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `data`; fails once the log is closed
    pub async fn write(&self, data: &[u8]) -> io::Result<()> {
        match self.writer.lock().await.as_mut() {
            Some(writer) => writer.write_all(data).await,
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session log is closed",
            )),
        }
    }

    /// Push buffered bytes to the file
    pub async fn flush(&self) -> io::Result<()> {
        match self.writer.lock().await.as_mut() {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }

    /// Flush and close; later calls are no-ops
    pub async fn close(&self) -> io::Result<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
            tracing::debug!("Closed session log {:?}", self.path);
        }
        Ok(())
    }

    /// Whether `close` has run
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}
