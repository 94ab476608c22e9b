//! Message content: the candidate pool, selection policy, and rotation cursor.

use std::str::FromStr;

use serde::Deserialize;

pub mod cursor;
pub mod pool;

pub use cursor::{FileCursor, IndexCursor, MemoryCursor};
pub use pool::{next_index, MessagePool, Selection};

/// How the next message body is chosen from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Independent uniform pick on every run.
    Random,
    /// Deterministic cycle driven by the persisted cursor.
    Rotating,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "rotating" => Ok(Self::Rotating),
            other => Err(format!("unknown selection mode: {other}")),
        }
    }
}

/// Errors from loading the pool or persisting the cursor.
#[derive(Debug, thiserror::Error)]
pub enum MessagesError {
    /// The pool has no messages.
    #[error("message pool is empty")]
    EmptyPool,

    /// Pool file could not be parsed.
    #[error("failed to parse message pool: {0}")]
    Parse(#[from] toml::de::Error),

    /// Filesystem access failed.
    #[error("io error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
