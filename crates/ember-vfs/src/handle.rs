//! Open-file handles over both backends.
//!
//! A handle is a tagged value: closed, a slot in the archive descriptor
//! pool, or an owned store file. Dispatch is a `match` on the tag; every
//! operation on a closed handle is [`FsError::BadHandle`]. Handles borrow
//! nothing from the [`Mount`], so the host can keep them in its own tables;
//! each operation takes the mount explicitly.

use alloc::vec::Vec;
use core::mem;

use crate::error::{FsError, StoreError};
use crate::mount::{route, Mount, Route};
use crate::path;
use crate::store::LogStore;
use crate::types::{Metadata, OpenMode, Whence};

/// Chunk size for line scans.
const LINE_CHUNK: usize = 256;

/// Chunk size for whole-file reads.
const READ_CHUNK: usize = 1024;

/// Parsed open-mode string.
///
/// The grammar is the original one: `r`, `w` or `a`, optionally followed by
/// `b`. Anything else is `UnsupportedMode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mode {
    pub open: OpenMode,
    pub binary: bool,
}

impl Mode {
    pub fn parse(s: &str) -> Result<Self, FsError> {
        let bytes = s.as_bytes();
        let open = match bytes.first() {
            Some(b'r') => OpenMode::Read,
            Some(b'w') => OpenMode::Write,
            Some(b'a') => OpenMode::Append,
            _ => return Err(FsError::UnsupportedMode),
        };
        let binary = match bytes.len() {
            1 => false,
            2 if bytes[1] == b'b' => true,
            _ => return Err(FsError::UnsupportedMode),
        };
        Ok(Self { open, binary })
    }

    pub fn writes(&self) -> bool {
        self.open != OpenMode::Read
    }
}

/// An open file on either backend.
pub enum FileHandle<S: LogStore> {
    Closed,
    Archive(usize),
    Store(S::File),
}

impl<'a, S: LogStore> Mount<'a, S> {
    /// Open `raw` with the given mode and hand back a handle.
    ///
    /// Reads of a missing path or of a directory are `NoSuchFile`; writes
    /// into the archive subtree are `PermissionDenied`; writes onto a
    /// directory are `CannotWriteToDirectory`. Write and append create the
    /// destination's parent directories first.
    pub fn open(&self, raw: &str, mode: &Mode) -> Result<FileHandle<S>, FsError> {
        let canonical = path::normalize(raw);
        let p = match route(&canonical) {
            Route::Archive(sub) => {
                if mode.writes() {
                    return Err(FsError::PermissionDenied);
                }
                let fd = self.archive().open(sub).map_err(|e| match e {
                    FsError::IsADirectory => FsError::NoSuchFile,
                    other => other,
                })?;
                return Ok(FileHandle::Archive(fd));
            }
            Route::Store(p) => p,
        };
        match mode.open {
            OpenMode::Read => {
                let file = self
                    .store()
                    .open(p, OpenMode::Read)
                    .map_err(|e| match e {
                        StoreError::NoEntry | StoreError::IsADirectory => FsError::NoSuchFile,
                        other => other.into(),
                    })?;
                Ok(FileHandle::Store(file))
            }
            OpenMode::Write | OpenMode::Append => {
                if let Ok(Metadata { is_dir: true, .. }) = self.store().stat(p) {
                    return Err(FsError::CannotWriteToDirectory);
                }
                self.recurse_mkdir(path::parent(p))?;
                let file = self.store().open(p, mode.open)?;
                Ok(FileHandle::Store(file))
            }
        }
    }
}

impl<S: LogStore> FileHandle<S> {
    fn read_raw(&mut self, fs: &Mount<'_, S>, buf: &mut [u8]) -> Result<usize, FsError> {
        match self {
            FileHandle::Closed => Err(FsError::BadHandle),
            FileHandle::Archive(fd) => fs.archive().read(*fd, buf),
            FileHandle::Store(file) => Ok(fs.store().read(file, buf)?),
        }
    }

    /// All bytes from the current position, or `None` when nothing remains.
    pub fn read_all(&mut self, fs: &Mount<'_, S>) -> Result<Option<Vec<u8>>, FsError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.read_raw(fs, &mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(if out.is_empty() { None } else { Some(out) })
    }

    /// The next line, scanning in fixed-size chunks and seeking back to just
    /// past the newline. Returns `None` only at end-of-data; a trailing
    /// unterminated line is returned once. `with_newline` keeps the `\n`.
    pub fn read_line(
        &mut self,
        fs: &Mount<'_, S>,
        with_newline: bool,
    ) -> Result<Option<Vec<u8>>, FsError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; LINE_CHUNK];
        let mut found = false;
        loop {
            let n = self.read_raw(fs, &mut chunk)?;
            if n == 0 {
                break;
            }
            match chunk[..n].iter().position(|&b| b == b'\n') {
                Some(at) => {
                    out.extend_from_slice(&chunk[..=at]);
                    let overshoot = (n - at - 1) as i64;
                    self.seek(fs, Whence::Current, -overshoot)?;
                    found = true;
                    break;
                }
                None => out.extend_from_slice(&chunk[..n]),
            }
        }
        if out.is_empty() && !found {
            return Ok(None);
        }
        if found && !with_newline {
            out.pop();
        }
        Ok(Some(out))
    }

    /// Up to `n` bytes, or `None` at end-of-data.
    pub fn read(&mut self, fs: &Mount<'_, S>, n: usize) -> Result<Option<Vec<u8>>, FsError> {
        let mut out = alloc::vec![0u8; n];
        let got = self.read_raw(fs, &mut out)?;
        if got == 0 && n > 0 {
            return Ok(None);
        }
        out.truncate(got);
        Ok(Some(out))
    }

    /// A single byte, or `None` at end-of-data.
    pub fn read_byte(&mut self, fs: &Mount<'_, S>) -> Result<Option<u8>, FsError> {
        let mut one = [0u8; 1];
        if self.read_raw(fs, &mut one)? == 0 {
            return Ok(None);
        }
        Ok(Some(one[0]))
    }

    /// Write `data` at the current position.
    pub fn write(&mut self, fs: &Mount<'_, S>, data: &[u8]) -> Result<(), FsError> {
        match self {
            FileHandle::Closed => Err(FsError::BadHandle),
            FileHandle::Archive(_) => Err(FsError::PermissionDenied),
            FileHandle::Store(file) => {
                let mut written = 0;
                while written < data.len() {
                    written += fs.store().write(file, &data[written..])?;
                }
                fs.invalidate_space();
                Ok(())
            }
        }
    }

    /// Write `data` followed by a newline.
    pub fn write_line(&mut self, fs: &Mount<'_, S>, data: &[u8]) -> Result<(), FsError> {
        self.write(fs, data)?;
        self.write(fs, b"\n")
    }

    pub fn write_byte(&mut self, fs: &Mount<'_, S>, byte: u8) -> Result<(), FsError> {
        self.write(fs, &[byte])
    }

    /// Push buffered writes to flash.
    pub fn flush(&mut self, fs: &Mount<'_, S>) -> Result<(), FsError> {
        match self {
            FileHandle::Closed => Err(FsError::BadHandle),
            FileHandle::Archive(_) => Ok(()),
            FileHandle::Store(file) => {
                fs.store().sync(file)?;
                fs.invalidate_space();
                Ok(())
            }
        }
    }

    /// Move the position and return it. Note the backends disagree on
    /// `End`: the archive measures backwards from the end, the store
    /// forwards from it.
    pub fn seek(&mut self, fs: &Mount<'_, S>, whence: Whence, off: i64) -> Result<i64, FsError> {
        match self {
            FileHandle::Closed => Err(FsError::BadHandle),
            FileHandle::Archive(fd) => fs.archive().seek(*fd, whence, off),
            FileHandle::Store(file) => Ok(fs.store().seek(file, whence, off)? as i64),
        }
    }

    /// Release the backend resource. The free-space figures are dropped for
    /// both backends, whichever one the handle touched.
    pub fn close(&mut self, fs: &Mount<'_, S>) -> Result<(), FsError> {
        let taken = mem::replace(self, FileHandle::Closed);
        fs.invalidate_space();
        match taken {
            FileHandle::Closed => Err(FsError::BadHandle),
            FileHandle::Archive(fd) => fs.archive().close(fd),
            FileHandle::Store(file) => Ok(fs.store().close(file)?),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, FileHandle::Closed)
    }
}
