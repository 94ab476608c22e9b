//! Persisted rotation pointer into the message pool.
//!
//! Reads fail soft: a missing or unreadable cursor is position 0. Writes
//! report failure to the caller, who logs it and carries on. There is no
//! locking; runs are expected to be serialized by whatever triggers them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use super::MessagesError;

/// Persistence for the rotation cursor.
pub trait IndexCursor: Send + Sync {
    /// Current position, or 0 when absent or corrupt. Never fails.
    fn read(&self) -> usize;

    /// Persist a new position.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::Io`] when the value cannot be stored.
    fn write(&self, index: usize) -> Result<(), MessagesError>;
}

/// Cursor stored as a decimal integer in a small text file.
#[derive(Debug, Clone)]
pub struct FileCursor {
    path: PathBuf,
}

impl FileCursor {
    /// Cursor backed by `path`; the file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> MessagesError {
        MessagesError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl IndexCursor for FileCursor {
    fn read(&self) -> usize {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cursor file, starting at 0");
                return 0;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read cursor, using 0");
                return 0;
            }
        };

        match contents.trim().parse::<usize>() {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "corrupt cursor value, using 0"
                );
                0
            }
        }
    }

    fn write(&self, index: usize) -> Result<(), MessagesError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write-then-rename so a crash never leaves a half-written value.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("{index}\n")).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), index, "cursor persisted");
        Ok(())
    }
}

/// Process-local cursor, for on-demand runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCursor {
    value: AtomicUsize,
}

impl MemoryCursor {
    /// Cursor starting at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            value: AtomicUsize::new(index),
        }
    }
}

impl IndexCursor for MemoryCursor {
    fn read(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }

    fn write(&self, index: usize) -> Result<(), MessagesError> {
        self.value.store(index, Ordering::Relaxed);
        Ok(())
    }
}
