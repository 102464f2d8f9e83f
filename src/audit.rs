//! Append-only audit trail of node events.
//!
//! One line per event: `[YYYY-MM-DD HH:MM:SS] KIND: detail`. File output goes
//! through `tracing-appender`'s non-blocking worker so recording an event
//! never waits on disk.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    PeerJoined,
    PeerLeft,
    Message,
    MyMessage,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::PeerJoined => "PEER_JOINED",
            AuditKind::PeerLeft => "PEER_LEFT",
            AuditKind::Message => "MESSAGE",
            AuditKind::MyMessage => "MY_MESSAGE",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_BUFFERED_LINES: usize = 128_000;

pub struct AuditLog {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
    // Flushes pending lines when the log is dropped.
    _guard: Option<WorkerGuard>,
}

impl AuditLog {
    /// Open (or create) `path` for appending. Existing content is kept.
    pub fn open(path: &Path) -> crate::Result<Self> {
        Self::open_buffered(path, DEFAULT_BUFFERED_LINES)
    }

    /// Like [`AuditLog::open`], holding at most `buffered_lines` unwritten
    /// entries. Recording blocks rather than drops when the buffer is full.
    fn open_buffered(path: &Path, buffered_lines: usize) -> crate::Result<Self> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| crate::Error::config(format!("history path {path:?} has no file name")))?
            .to_string_lossy()
            .into_owned();

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .map_err(|e| crate::Error::config(format!("cannot open history file {path:?}: {e}")))?;
        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .buffered_lines_limit(buffered_lines)
            .finish(appender);

        tracing::info!("Recording history to {}", path.display());
        Ok(Self {
            writer: Some(Mutex::new(Box::new(writer))),
            _guard: Some(guard),
        })
    }

    /// Write entries to an arbitrary sink.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Some(Mutex::new(Box::new(writer))),
            _guard: None,
        }
    }

    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self {
            writer: None,
            _guard: None,
        }
    }

    pub fn record(&self, kind: AuditKind, detail: &str) {
        let Some(writer) = &self.writer else {
            return;
        };
        let line = format_entry(chrono::Local::now(), kind, detail);
        let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
            tracing::warn!("Failed to write history entry: {}", e);
        }
    }
}

fn format_entry<Tz>(at: chrono::DateTime<Tz>, kind: AuditKind, detail: &str) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: fmt::Display,
{
    // Keep each entry on one line even if the chat text had newlines.
    let detail = detail.replace(['\r', '\n'], " ");
    format!("{} {}: {}\n", at.format("[%Y-%m-%d %H:%M:%S]"), kind, detail)
}
