use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TailerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tails the web server's access log. Owns the open handle and the
/// knowledge of whether previously read content is still unconsumed.
///
/// Rotation is truncation-in-place: the writer holds its own handle to the
/// same inode and must keep writing to it, so the file is never renamed or
/// recreated. That is also why the handle is opened read+write.
pub struct LogTailer {
    path: PathBuf,
    max_log_size: u64,
    file: Option<File>,
    has_unconsumed: bool,
}

impl LogTailer {
    pub fn new(path: PathBuf, max_log_size: u64) -> Self {
        Self {
            path,
            max_log_size,
            file: None,
            has_unconsumed: false,
        }
    }

    pub fn source_exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Idempotent: opens the source read+write if no handle is held.
    pub fn ensure_open(&mut self) -> Result<(), TailerError> {
        if self.file.is_none() {
            self.file = Some(OpenOptions::new().read(true).write(true).open(&self.path)?);
        }
        Ok(())
    }

    /// Read everything appended since the last call (or since open).
    /// Returns the new content; empty means the writer has not appended.
    pub fn read_available(&mut self) -> Result<String, TailerError> {
        self.ensure_open()?;

        // A misbehaving producer (or a consumer that has fallen far behind)
        // must not pull the whole file into memory. Discard and start over.
        let len = self.file.as_ref().map(|f| f.metadata()).transpose()?;
        if let Some(len) = len.map(|m| m.len()) {
            if len > self.max_log_size {
                warn!(
                    path = %self.path.display(),
                    size = len,
                    ceiling = self.max_log_size,
                    "Access log exceeded size ceiling, discarding unread content"
                );
                self.truncate_and_reopen()?;
                return Ok(String::new());
            }
        }

        let mut buf = Vec::new();
        if let Some(file) = self.file.as_mut() {
            file.read_to_end(&mut buf)?;
        }

        if !buf.is_empty() {
            self.has_unconsumed = true;
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Called when a read returned nothing. If prior content was consumed,
    /// the writer has caught up with us and the file can be reclaimed:
    /// truncate to zero and reopen a fresh handle. Never truncates a file
    /// whose content was not actually read.
    pub fn reclaim_if_idle(&mut self) -> Result<bool, TailerError> {
        if !self.has_unconsumed {
            return Ok(false);
        }

        info!(path = %self.path.display(), "Truncating consumed access log");
        self.truncate_and_reopen()?;
        Ok(true)
    }

    fn truncate_and_reopen(&mut self) -> Result<(), TailerError> {
        if let Some(file) = self.file.take() {
            file.set_len(0)?;
        }
        self.has_unconsumed = false;
        self.ensure_open()
    }
}
