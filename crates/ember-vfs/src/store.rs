//! Call surface of the log-structured flash store.
//!
//! The store itself is an external library driven through this trait; the
//! routing layer ([`crate::mount::Mount`]) is generic over it and the test
//! suites run against the RAM-backed [`crate::memory::MemoryStore`].
//!
//! All methods take `&self`; implementations use interior mutability, since
//! every call arrives from the single host execution context. `File` and
//! `Dir` are opaque to the caller and must be handed back to `close` /
//! `close_dir` when done.

use crate::error::StoreError;
use crate::types::{EntryInfo, Metadata, OpenMode, Whence};

/// Block-level usage counters, as reported by the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Bytes per block
    pub block_size: u64,
    /// Total blocks in the mounted region
    pub block_count: u64,
    /// Blocks currently allocated
    pub used_blocks: u64,
}

impl StoreStats {
    /// Total capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.block_size * self.block_count
    }

    /// Allocated bytes, rounded up to whole blocks.
    pub fn used(&self) -> u64 {
        self.block_size * self.used_blocks
    }
}

/// A log-structured store attached to the writable flash region.
pub trait LogStore {
    /// Opaque open-file state.
    type File;
    /// Opaque directory iteration state.
    type Dir;

    /// Attach to the on-flash structures.
    fn mount(&self) -> Result<(), StoreError>;

    /// Erase the region and write fresh structures.
    fn format(&self) -> Result<(), StoreError>;

    /// Open a file. `Write` truncates, `Append` positions at the end; both
    /// create the file if missing.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File, StoreError>;

    /// Read up to `buf.len()` bytes; 0 at end-of-file.
    fn read(&self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Write `data` at the current position, extending the file as needed.
    fn write(&self, file: &mut Self::File, data: &[u8]) -> Result<usize, StoreError>;

    /// Move the position. `End` is `size + off` (negative offsets seek
    /// backwards from the end); a negative target is an error.
    fn seek(&self, file: &mut Self::File, whence: Whence, off: i64) -> Result<u64, StoreError>;

    /// Current position.
    fn tell(&self, file: &mut Self::File) -> Result<u64, StoreError>;

    /// Current file size, counting unflushed writes.
    fn size(&self, file: &mut Self::File) -> Result<u64, StoreError>;

    /// Commit buffered writes to flash.
    fn sync(&self, file: &mut Self::File) -> Result<(), StoreError>;

    /// Flush and release an open file.
    fn close(&self, file: Self::File) -> Result<(), StoreError>;

    /// Begin iterating a directory.
    fn open_dir(&self, path: &str) -> Result<Self::Dir, StoreError>;

    /// Yield the next entry, or `None` when exhausted.
    fn read_dir(&self, dir: &mut Self::Dir) -> Result<Option<EntryInfo>, StoreError>;

    /// Release a directory iterator.
    fn close_dir(&self, dir: Self::Dir) -> Result<(), StoreError>;

    /// Metadata for a single path.
    fn stat(&self, path: &str) -> Result<Metadata, StoreError>;

    /// Create one directory level; the parent must exist.
    fn mkdir(&self, path: &str) -> Result<(), StoreError>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Rename a file or directory within the store.
    fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Block usage counters for free-space reporting.
    fn stats(&self) -> Result<StoreStats, StoreError>;
}
