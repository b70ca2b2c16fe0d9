#![forbid(unsafe_code)]
//! Error types for ChainFS.
//!
//! Defines `CfsError` and a `Result<T>` alias used throughout the workspace.
//! Includes the mapping from each error to its wire-protocol reply line.

use thiserror::Error;

/// Unified error type for all ChainFS file-system operations.
#[derive(Debug, Error)]
pub enum CfsError {
    /// A file name exceeds the 11-byte on-disk name field.
    #[error("filename too long")]
    NameTooLong,

    /// Every inode slot is occupied.
    #[error("Maximum file limit reached")]
    InodeTableFull,

    /// The named file does not exist.
    #[error("file {0} does not exist")]
    NotFound(String),

    /// Not enough free blocks, or the content exceeds the 16-bit size field.
    #[error("file too large or insufficient space")]
    NoSpace,

    /// Backing-file failure. In-memory state may diverge from disk after
    /// this; callers recover by reopening the file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk state violates a layout invariant. Fatal at load time.
    #[error("corrupt file system: {0}")]
    Corrupt(String),
}

impl CfsError {
    /// The single reply line the server sends for this error.
    #[must_use]
    pub fn wire_message(&self) -> String {
        format!("ERROR: {self}")
    }
}

/// Result alias using `CfsError`.
pub type Result<T> = std::result::Result<T, CfsError>;
