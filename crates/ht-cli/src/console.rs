//! Line-oriented live view
//!
//! Every host gets a pane that writes to one shared terminal stream. Output
//! is emitted a line at a time, each line prefixed with the pane title, so
//! concurrent hosts never interleave inside a line.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use crossterm::style::Stylize;
use parking_lot::Mutex;

use ht_core::traits::{Layout, Pane, Sink};
use ht_core::types::TerminalSize;

/// Shared terminal writer; also serializes geometry queries against output
type SharedOut = Arc<Mutex<Box<dyn Write + Send>>>;

/// A pane that prefixes every complete line with its title
pub struct PrefixedPane {
    prefix: String,
    prefix_width: u16,
    partial: Mutex<Vec<u8>>,
    out: SharedOut,
    query_size: bool,
}

impl PrefixedPane {
    fn emit(&self, out: &mut dyn Write, line: &[u8]) -> io::Result<()> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        out.write_all(self.prefix.as_bytes())?;
        out.write_all(line)?;
        out.write_all(b"\n")
    }

    /// Write out any unterminated last line
    pub fn finish(&self) -> io::Result<()> {
        let rest = std::mem::take(&mut *self.partial.lock());
        if rest.is_empty() {
            return Ok(());
        }
        let mut out = self.out.lock();
        self.emit(&mut **out, &rest)?;
        out.flush()
    }
}

impl Sink for PrefixedPane {
    fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut partial = self.partial.lock();
        partial.extend_from_slice(data);

        let Some(last_newline) = partial.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete: Vec<u8> = partial.drain(..=last_newline).collect();
        drop(partial);

        let mut out = self.out.lock();
        for line in complete[..complete.len() - 1].split(|b| *b == b'\n') {
            self.emit(&mut **out, line)?;
        }
        out.flush()
    }
}

impl Pane for PrefixedPane {
    fn geometry(&self) -> Option<TerminalSize> {
        if !self.query_size {
            return None;
        }
        // hold the output lock so the query never races a write
        let _out = self.out.lock();
        let (cols, rows) = crossterm::terminal::size().ok()?;
        let cols = cols.saturating_sub(self.prefix_width);
        (cols > 0 && rows > 0).then(|| TerminalSize::new(rows, cols))
    }
}

/// Layout that hands out [`PrefixedPane`]s over a single writer
pub struct LineLayout {
    out: SharedOut,
    panes: Mutex<HashMap<String, Arc<PrefixedPane>>>,
    color: bool,
    query_size: bool,
}

impl LineLayout {
    /// Panes on stdout, colored and sized when stdout is a terminal
    pub fn stdout() -> Self {
        use std::io::IsTerminal;

        let tty = io::stdout().is_terminal();
        Self {
            out: Arc::new(Mutex::new(Box::new(io::stdout()))),
            panes: Mutex::new(HashMap::new()),
            color: tty,
            query_size: tty,
        }
    }

    /// Panes over an arbitrary writer, plain and unsized
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
            panes: Mutex::new(HashMap::new()),
            color: false,
            query_size: false,
        }
    }

    fn prefix(&self, title: &str) -> String {
        let label = format!("[{}]", title);
        if self.color {
            format!("{} ", label.cyan())
        } else {
            format!("{} ", label)
        }
    }
}

impl Layout for LineLayout {
    fn open_pane(&self, title: &str) -> Arc<dyn Pane> {
        let pane = Arc::new(PrefixedPane {
            prefix: self.prefix(title),
            prefix_width: u16::try_from(title.chars().count() + 3).unwrap_or(u16::MAX),
            partial: Mutex::new(Vec::new()),
            out: Arc::clone(&self.out),
            query_size: self.query_size,
        });
        self.panes.lock().insert(title.to_string(), Arc::clone(&pane));
        pane
    }

    fn close_pane(&self, title: &str) {
        if let Some(pane) = self.panes.lock().remove(title) {
            if let Err(e) = pane.finish() {
                tracing::debug!("Failed to flush pane {}: {}", title, e);
            }
        }
    }

    fn reflow(&self, titles: &[String]) {
        tracing::debug!("Layout: {}", titles.join(", "));
    }
}
