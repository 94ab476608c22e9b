//! Immutable message pool and the selection policy over it.

use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{IndexCursor, MessagesError, SelectionMode};

/// Ordered, non-empty sequence of candidate message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePool {
    messages: Vec<String>,
}

/// On-disk shape of the pool file.
#[derive(Debug, Deserialize)]
struct PoolFile {
    messages: Vec<String>,
}

/// A message chosen for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Position in the pool.
    pub index: usize,
    /// Message body to send.
    pub body: String,
    /// Policy that produced this pick.
    pub mode: SelectionMode,
}

impl Selection {
    /// Whether a successful send should move the cursor on.
    pub fn advances_cursor(&self) -> bool {
        self.mode == SelectionMode::Rotating
    }
}

/// Cursor position following `current` in a pool of `len` messages.
///
/// Wraps to 0 after the last index; an empty pool also yields 0.
pub fn next_index(current: usize, len: usize) -> usize {
    current.saturating_add(1).checked_rem(len).unwrap_or(0)
}

impl MessagePool {
    /// Build a pool from message bodies.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::EmptyPool`] when `messages` is empty.
    pub fn new(messages: Vec<String>) -> Result<Self, MessagesError> {
        if messages.is_empty() {
            return Err(MessagesError::EmptyPool);
        }
        Ok(Self { messages })
    }

    /// Parse a pool from TOML of the form `messages = ["...", ...]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or the list is empty.
    pub fn from_toml(toml_str: &str) -> Result<Self, MessagesError> {
        let file: PoolFile = toml::from_str(toml_str)?;
        Self::new(file.messages)
    }

    /// Load a pool file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is empty.
    pub fn load(path: &Path) -> Result<Self, MessagesError> {
        let contents = std::fs::read_to_string(path).map_err(|source| MessagesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let pool = Self::from_toml(&contents)?;
        debug!(path = %path.display(), count = pool.len(), "message pool loaded");
        Ok(pool)
    }

    /// Number of messages (always at least one).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Message at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.messages.get(index).map(String::as_str)
    }

    /// Choose a message under `mode`.
    ///
    /// Rotating mode reads the cursor; the caller advances it only after a
    /// confirmed delivery.
    pub fn pick(&self, mode: SelectionMode, cursor: &dyn IndexCursor) -> Selection {
        match mode {
            SelectionMode::Random => self.pick_random_with(&mut rand::thread_rng()),
            SelectionMode::Rotating => self.pick_rotating(cursor.read()),
        }
    }

    /// Uniform pick across the whole pool using the supplied RNG.
    pub fn pick_random_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Selection {
        let index = rng.gen_range(0..self.len());
        self.selection(index, SelectionMode::Random)
    }

    /// Pick at a cursor position; out-of-range positions fall back to 0.
    pub fn pick_rotating(&self, cursor: usize) -> Selection {
        let index = if cursor < self.len() {
            cursor
        } else {
            warn!(
                cursor,
                pool_len = self.len(),
                "cursor outside message pool, restarting rotation"
            );
            0
        };
        self.selection(index, SelectionMode::Rotating)
    }

    /// Cursor value to persist after delivering `selection`.
    pub fn next_after(&self, selection: &Selection) -> usize {
        next_index(selection.index, self.len())
    }

    fn selection(&self, index: usize, mode: SelectionMode) -> Selection {
        let body = self.get(index).unwrap_or_default().to_owned();
        Selection { index, body, mode }
    }
}
