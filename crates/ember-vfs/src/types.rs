//! Shared filesystem types.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Metadata for a single path, as reported by `stat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Whether the path names a directory
    pub is_dir: bool,
    /// Byte size; 0 for directories
    pub size: u64,
}

/// One entry yielded by directory iteration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Entry name (final segment only)
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Byte size; 0 for directories
    pub size: u64,
}

/// Seek origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// How a file is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only; the file must exist
    Read,
    /// Write; created if missing, truncated otherwise
    Write,
    /// Append; created if missing, writes always land at the end
    Append,
}

/// Memoized (capacity, used) pair for one backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Total bytes in the backend
    pub capacity: u64,
    /// Bytes currently in use
    pub used: u64,
}

impl SpaceInfo {
    /// Bytes still available.
    pub fn free(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Attribute record exposed to the scripting host.
///
/// Neither backend tracks modification or creation time; those fields are
/// always zero but kept in the record shape the host expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub size: u64,
    pub is_dir: bool,
    pub is_read_only: bool,
    pub modification: u64,
    pub modified: u64,
    pub created: u64,
}

impl Attributes {
    /// Attributes for an entry with zeroed timestamps.
    pub fn new(size: u64, is_dir: bool, is_read_only: bool) -> Self {
        Self {
            size,
            is_dir,
            is_read_only,
            modification: 0,
            modified: 0,
            created: 0,
        }
    }
}
