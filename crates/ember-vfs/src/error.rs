//! Error types for the VFS layer.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Errors from VFS operations.
///
/// The `Display` text is the user-visible reason; the binding layer prefixes
/// it with the offending path (`"<path>: <reason>"`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsError {
    /// Path does not exist
    NoSuchFile,

    /// A non-terminal path segment names a file
    NotADirectory,

    /// File operation attempted on a directory
    IsADirectory,

    /// Open-for-write attempted on a directory
    CannotWriteToDirectory,

    /// Mutation attempted on the archive subtree
    PermissionDenied,

    /// Open-mode string outside the `r`/`w`/`a` (+`b`) grammar
    UnsupportedMode,

    /// Operation on a closed handle
    BadHandle,

    /// Fixed descriptor or cursor pool exhausted
    TooManyOpenFiles,

    /// Recursive copy failed partway
    CopyFailed,

    /// Archive structural tag mismatch
    Corrupt,

    /// Opaque underlying-store failure, with platform error text
    Io(String),
}

impl FsError {
    /// Create an I/O error with message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FsError::NoSuchFile => write!(f, "No such file"),
            FsError::NotADirectory => write!(f, "Not a directory"),
            FsError::IsADirectory => write!(f, "Is a directory"),
            FsError::CannotWriteToDirectory => write!(f, "Cannot write to directory"),
            FsError::PermissionDenied => write!(f, "Permission denied"),
            FsError::UnsupportedMode => write!(f, "Unsupported mode"),
            FsError::BadHandle => write!(f, "attempt to use a closed file"),
            FsError::TooManyOpenFiles => write!(f, "Too many open files"),
            FsError::CopyFailed => write!(f, "Failed to copy"),
            FsError::Corrupt => write!(f, "Archive structure corrupt"),
            FsError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

/// Errors from the underlying log-structured store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    /// No such entry
    NoEntry,

    /// Entry is not a directory
    NotADirectory,

    /// Entry is a directory
    IsADirectory,

    /// Entry already exists
    AlreadyExists,

    /// Directory not empty
    NotEmpty,

    /// No space left in the flash window
    NoSpace,

    /// On-flash structure corrupt (mount failure)
    Corrupt,

    /// Other platform failure
    Io(String),
}

impl StoreError {
    /// Create an I/O error with message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::NoEntry => write!(f, "No such file or directory"),
            StoreError::NotADirectory => write!(f, "Not a directory"),
            StoreError::IsADirectory => write!(f, "Is a directory"),
            StoreError::AlreadyExists => write!(f, "File exists"),
            StoreError::NotEmpty => write!(f, "Directory not empty"),
            StoreError::NoSpace => write!(f, "No space left on device"),
            StoreError::Corrupt => write!(f, "Filesystem corrupt"),
            StoreError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<StoreError> for FsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoEntry => FsError::NoSuchFile,
            StoreError::NotADirectory => FsError::NotADirectory,
            StoreError::IsADirectory => FsError::IsADirectory,
            other => FsError::Io(alloc::format!("{}", other)),
        }
    }
}
