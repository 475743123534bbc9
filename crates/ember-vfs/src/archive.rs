//! Reader for the immutable archive image.
//!
//! The archive is one contiguous read-only byte range baked into firmware,
//! addressed by offsets relative to its base.
//!
//! # On-disk layout
//!
//! ```text
//! directory node:
//!   0x00 | u32 | magic ("MMfs")
//!   0x04 | u32 | entry count
//!   0x08 | ... | entries, sorted by byte-wise name order
//!
//! entry (32 bytes):
//!   0x00 | [u8; 24] | NUL-padded name
//!   0x18 | u32      | bit 0: is_dir, bits 1..32: size
//!   0x1c | u32      | offset of the body, relative to the image base
//! ```
//!
//! A file body is the raw range `offset .. offset + size`. The sort order
//! is a build-time invariant of the image generator; the reader depends on
//! it for binary search and never re-sorts.
//!
//! Open files and directory cursors come from fixed pools; the reader
//! allocates nothing persistent beyond them.

use alloc::string::String;
use core::cell::RefCell;

use crate::error::FsError;
use crate::types::{EntryInfo, Metadata};

/// Directory node tag ("MMfs" little-endian).
pub const ARCHIVE_MAGIC: u32 = 0x7366_4D4D;

/// Capacity of the open-file pool.
pub const MAX_FDS: usize = 128;

/// Capacity of the directory cursor pool.
pub const MAX_DIRS: usize = MAX_FDS / 8;

/// Bytes reserved for an entry name (including NUL padding).
const NAME_LEN: usize = 24;

/// Size of one packed directory entry.
const ENTRY_SIZE: usize = 32;

/// Size of a directory node header (magic + count).
const DIR_HEADER: usize = 8;

/// An open file: byte pointers into the image.
#[derive(Clone, Copy)]
struct Fd {
    start: u32,
    len: u32,
    /// Position relative to `start`. Unclamped: seeks may leave it negative
    /// or past the end, and reads from there simply yield no bytes.
    pos: i64,
}

/// An open directory cursor.
#[derive(Clone, Copy)]
struct DirCursor {
    dir_off: u32,
    index: u32,
}

/// A resolved directory entry.
#[derive(Clone, Copy)]
struct Node {
    is_dir: bool,
    size: u32,
    offset: u32,
}

impl Node {
    const ROOT: Node = Node {
        is_dir: true,
        size: 0,
        offset: 0,
    };
}

/// Read-only view of a mounted archive image.
pub struct Archive<'a> {
    image: &'a [u8],
    fds: RefCell<[Option<Fd>; MAX_FDS]>,
    dirs: RefCell<[Option<DirCursor>; MAX_DIRS]>,
}

impl<'a> Archive<'a> {
    /// Mount an image, validating the root directory tag.
    pub fn mount(image: &'a [u8]) -> Result<Self, FsError> {
        let archive = Self {
            image,
            fds: RefCell::new([None; MAX_FDS]),
            dirs: RefCell::new([None; MAX_DIRS]),
        };
        archive.dir_count(0)?;
        Ok(archive)
    }

    // ========== Image access ==========

    fn read_u32(&self, off: usize) -> Result<u32, FsError> {
        let bytes = self
            .image
            .get(off..off + 4)
            .ok_or(FsError::Corrupt)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Validate the node at `dir_off` and return its entry count.
    fn dir_count(&self, dir_off: u32) -> Result<u32, FsError> {
        let off = dir_off as usize;
        if self.read_u32(off)? != ARCHIVE_MAGIC {
            return Err(FsError::Corrupt);
        }
        let count = self.read_u32(off + 4)?;
        let end = off + DIR_HEADER + count as usize * ENTRY_SIZE;
        if end > self.image.len() {
            return Err(FsError::Corrupt);
        }
        Ok(count)
    }

    /// Decode entry `index` of the directory node at `dir_off`.
    fn entry(&self, dir_off: u32, index: u32) -> Result<(&'a [u8], Node), FsError> {
        let base = dir_off as usize + DIR_HEADER + index as usize * ENTRY_SIZE;
        let name_raw = self
            .image
            .get(base..base + NAME_LEN)
            .ok_or(FsError::Corrupt)?;
        let nul = name_raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let packed = self.read_u32(base + NAME_LEN)?;
        let offset = self.read_u32(base + NAME_LEN + 4)?;
        let node = Node {
            is_dir: packed & 1 != 0,
            size: packed >> 1,
            offset,
        };
        Ok((&name_raw[..nul], node))
    }

    /// Walk `path` segment by segment, binary-searching each level.
    fn traverse(&self, path: &str) -> Result<Node, FsError> {
        let mut node: Option<Node> = None;
        let mut dir_off = 0u32;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(n) = node {
                if !n.is_dir {
                    return Err(FsError::NotADirectory);
                }
                dir_off = n.offset;
            }
            let count = self.dir_count(dir_off)?;
            let (mut lo, mut hi) = (0u32, count);
            node = loop {
                if lo >= hi {
                    return Err(FsError::NoSuchFile);
                }
                let mid = lo + (hi - lo) / 2;
                let (name, n) = self.entry(dir_off, mid)?;
                match seg.as_bytes().cmp(name) {
                    core::cmp::Ordering::Equal => break Some(n),
                    core::cmp::Ordering::Greater => lo = mid + 1,
                    core::cmp::Ordering::Less => hi = mid,
                }
            };
        }
        Ok(node.unwrap_or(Node::ROOT))
    }

    // ========== File operations ==========

    /// Open a file, allocating the first free descriptor slot.
    pub fn open(&self, path: &str) -> Result<usize, FsError> {
        let mut fds = self.fds.borrow_mut();
        let slot = fds
            .iter()
            .position(|fd| fd.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        let node = self.traverse(path)?;
        if node.is_dir {
            return Err(FsError::IsADirectory);
        }
        fds[slot] = Some(Fd {
            start: node.offset,
            len: node.size,
            pos: 0,
        });
        Ok(slot)
    }

    /// Read up to `buf.len()` bytes at the current position; returns the
    /// number of bytes copied, 0 at end-of-data.
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut fds = self.fds.borrow_mut();
        let f = fds
            .get_mut(fd)
            .and_then(|s| s.as_mut())
            .ok_or(FsError::BadHandle)?;
        if f.pos < 0 || f.pos >= f.len as i64 {
            return Ok(0);
        }
        let avail = (f.len as i64 - f.pos) as usize;
        let n = buf.len().min(avail);
        let start = f.start as usize + f.pos as usize;
        let src = self.image.get(start..start + n).ok_or(FsError::Corrupt)?;
        buf[..n].copy_from_slice(src);
        f.pos += n as i64;
        Ok(n)
    }

    /// Move the file position. `End` measures backwards from the end of the
    /// entry; no clamping is applied beyond what the arithmetic implies.
    pub fn seek(&self, fd: usize, whence: crate::types::Whence, off: i64) -> Result<i64, FsError> {
        use crate::types::Whence;
        let mut fds = self.fds.borrow_mut();
        let f = fds
            .get_mut(fd)
            .and_then(|s| s.as_mut())
            .ok_or(FsError::BadHandle)?;
        f.pos = match whence {
            Whence::Start => off,
            Whence::Current => f.pos + off,
            Whence::End => f.len as i64 - off,
        };
        Ok(f.pos)
    }

    /// Release a descriptor slot.
    pub fn close(&self, fd: usize) -> Result<(), FsError> {
        let mut fds = self.fds.borrow_mut();
        let slot = fds.get_mut(fd).ok_or(FsError::BadHandle)?;
        if slot.is_none() {
            return Err(FsError::BadHandle);
        }
        *slot = None;
        Ok(())
    }

    // ========== Directory operations ==========

    /// Open a directory cursor. `""` and `"/"` name the root.
    pub fn open_dir(&self, path: &str) -> Result<usize, FsError> {
        let mut dirs = self.dirs.borrow_mut();
        let slot = dirs
            .iter()
            .position(|d| d.is_none())
            .ok_or(FsError::TooManyOpenFiles)?;
        let dir_off = if path.is_empty() || path == "/" {
            0
        } else {
            let node = self.traverse(path)?;
            if !node.is_dir {
                return Err(FsError::NotADirectory);
            }
            node.offset
        };
        self.dir_count(dir_off)?;
        dirs[slot] = Some(DirCursor { dir_off, index: 0 });
        Ok(slot)
    }

    /// Yield the next entry in storage order (already name-sorted), or
    /// `None` when the directory is exhausted.
    pub fn read_dir(&self, cursor: usize) -> Result<Option<EntryInfo>, FsError> {
        let mut dirs = self.dirs.borrow_mut();
        let c = dirs
            .get_mut(cursor)
            .and_then(|s| s.as_mut())
            .ok_or(FsError::BadHandle)?;
        let count = self.dir_count(c.dir_off)?;
        if c.index >= count {
            return Ok(None);
        }
        let (name, node) = self.entry(c.dir_off, c.index)?;
        c.index += 1;
        Ok(Some(EntryInfo {
            name: String::from_utf8_lossy(name).into_owned(),
            is_dir: node.is_dir,
            size: if node.is_dir { 0 } else { node.size as u64 },
        }))
    }

    /// Release a directory cursor.
    pub fn close_dir(&self, cursor: usize) -> Result<(), FsError> {
        let mut dirs = self.dirs.borrow_mut();
        let slot = dirs.get_mut(cursor).ok_or(FsError::BadHandle)?;
        if slot.is_none() {
            return Err(FsError::BadHandle);
        }
        *slot = None;
        Ok(())
    }

    // ========== Metadata ==========

    /// Stat a path. Directories report size 0.
    pub fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let node = self.traverse(path)?;
        Ok(Metadata {
            is_dir: node.is_dir,
            size: if node.is_dir { 0 } else { node.size as u64 },
        })
    }
}
