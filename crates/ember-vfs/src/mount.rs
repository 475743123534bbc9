//! Backend routing and the whole-tree operations built on top of it.
//!
//! [`Mount`] is the process-wide filesystem context: the archive reader, the
//! mutable store, and the memoized free-space figures. It is created once at
//! boot and handed to every operation; nothing here is a global.
//!
//! Routing is purely textual over the canonical path: `/rom` and everything
//! below it belongs to the archive (prefix stripped before the reader sees
//! it), everything else belongs to the store. Mutations aimed at the archive
//! subtree are rejected with `PermissionDenied` before any backend is
//! touched.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;

use crate::archive::Archive;
use crate::error::{FsError, StoreError};
use crate::path;
use crate::store::LogStore;
use crate::types::{Attributes, Metadata, OpenMode, SpaceInfo};

/// Streaming buffer for recursive copies.
const COPY_BUF: usize = 1024;

/// Which backend a canonical path belongs to.
pub(crate) enum Route<'p> {
    /// Archive-relative subpath (`""` is the archive root)
    Archive(&'p str),
    /// Store path, unchanged
    Store(&'p str),
}

pub(crate) fn route(canonical: &str) -> Route<'_> {
    if canonical == "/rom" {
        Route::Archive("")
    } else if let Some(sub) = canonical.strip_prefix("/rom/") {
        Route::Archive(sub)
    } else {
        Route::Store(canonical)
    }
}

/// The mounted filesystem pair.
pub struct Mount<'a, S: LogStore> {
    archive: Archive<'a>,
    store: S,
    space_cache: Cell<Option<SpaceInfo>>,
}

impl<'a, S: LogStore> Mount<'a, S> {
    /// Mount both backends. A store that fails its first mount is formatted
    /// and mounted again; the archive must be intact.
    pub fn new(image: &'a [u8], store: S) -> Result<Self, FsError> {
        let archive = Archive::mount(image)?;
        if store.mount().is_err() {
            store.format()?;
            store.mount()?;
        }
        Ok(Self {
            archive,
            store,
            space_cache: Cell::new(None),
        })
    }

    pub(crate) fn archive(&self) -> &Archive<'a> {
        &self.archive
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Forget the memoized space figures; the next query recomputes them.
    pub(crate) fn invalidate_space(&self) {
        self.space_cache.set(None);
    }

    fn stat_canonical(&self, canonical: &str) -> Result<Metadata, FsError> {
        match route(canonical) {
            Route::Archive(sub) => self.archive.stat(sub),
            Route::Store(p) => Ok(self.store.stat(p)?),
        }
    }

    // ========== Queries ==========

    /// Merged directory listing: entry names, byte-sorted, with a virtual
    /// `rom` entry injected at the root.
    pub fn list(&self, raw: &str) -> Result<Vec<String>, FsError> {
        let canonical = path::normalize(raw);
        let mut names = match route(&canonical) {
            Route::Archive(sub) => {
                let cursor = self.archive.open_dir(sub).map_err(|e| match e {
                    FsError::NoSuchFile | FsError::NotADirectory => FsError::NotADirectory,
                    other => other,
                })?;
                let result: Result<Vec<String>, FsError> = (|| {
                    let mut names = Vec::new();
                    while let Some(entry) = self.archive.read_dir(cursor)? {
                        names.push(entry.name);
                    }
                    Ok(names)
                })();
                let _ = self.archive.close_dir(cursor);
                result?
            }
            Route::Store(p) => {
                let mut dir = self.store.open_dir(p).map_err(|e| match e {
                    StoreError::NoEntry | StoreError::NotADirectory => FsError::NotADirectory,
                    other => other.into(),
                })?;
                let mut names = Vec::new();
                loop {
                    match self.store.read_dir(&mut dir) {
                        Ok(Some(entry)) => names.push(entry.name),
                        Ok(None) => break,
                        Err(e) => {
                            let _ = self.store.close_dir(dir);
                            return Err(e.into());
                        }
                    }
                }
                self.store.close_dir(dir)?;
                names
            }
        };
        if canonical == "/" {
            names.push(String::from("rom"));
        }
        names.sort_unstable();
        Ok(names)
    }

    pub fn exists(&self, raw: &str) -> bool {
        self.stat_canonical(&path::normalize(raw)).is_ok()
    }

    pub fn is_dir(&self, raw: &str) -> bool {
        matches!(
            self.stat_canonical(&path::normalize(raw)),
            Ok(Metadata { is_dir: true, .. })
        )
    }

    /// True exactly for the archive subtree. A missing store path inherits
    /// the answer of its nearest existing ancestor, which is always
    /// writable, so no backend call is needed.
    pub fn is_read_only(&self, raw: &str) -> bool {
        matches!(route(&path::normalize(raw)), Route::Archive(_))
    }

    /// Final path segment; the root is called `root`.
    pub fn get_name(&self, raw: &str) -> String {
        let canonical = path::normalize(raw);
        let name = path::file_name(&canonical);
        if name.is_empty() {
            String::from("root")
        } else {
            String::from(name)
        }
    }

    /// Fixed label of the backing drive.
    pub fn get_drive(&self, raw: &str) -> &'static str {
        match route(&path::normalize(raw)) {
            Route::Archive(_) => "rom",
            Route::Store(_) => "hdd",
        }
    }

    /// Byte size; directories report 0.
    pub fn get_size(&self, raw: &str) -> Result<u64, FsError> {
        Ok(self.stat_canonical(&path::normalize(raw))?.size)
    }

    fn space_info(&self) -> Result<SpaceInfo, FsError> {
        if let Some(info) = self.space_cache.get() {
            return Ok(info);
        }
        let stats = self.store.stats()?;
        let info = SpaceInfo {
            capacity: stats.capacity(),
            used: stats.used(),
        };
        self.space_cache.set(Some(info));
        Ok(info)
    }

    /// Free bytes on the backend owning `raw`; the archive reports 0.
    pub fn get_free_space(&self, raw: &str) -> Result<u64, FsError> {
        match route(&path::normalize(raw)) {
            Route::Archive(_) => Ok(0),
            Route::Store(_) => Ok(self.space_info()?.free()),
        }
    }

    /// Total bytes on the backend owning `raw`; the archive reports 0.
    pub fn get_capacity(&self, raw: &str) -> Result<u64, FsError> {
        match route(&path::normalize(raw)) {
            Route::Archive(_) => Ok(0),
            Route::Store(_) => Ok(self.space_info()?.capacity),
        }
    }

    /// Parent directory, without the leading separator.
    pub fn get_dir(&self, raw: &str) -> String {
        let canonical = path::normalize(raw);
        let parent = path::parent(&canonical);
        String::from(parent.strip_prefix('/').unwrap_or(parent))
    }

    /// Attribute record, or `None` for a missing path.
    pub fn attributes(&self, raw: &str) -> Option<Attributes> {
        let canonical = path::normalize(raw);
        let meta = self.stat_canonical(&canonical).ok()?;
        let read_only = matches!(route(&canonical), Route::Archive(_));
        Some(Attributes::new(meta.size, meta.is_dir, read_only))
    }

    // ========== Mutations ==========

    /// Create a directory and any missing ancestors. Creating an existing
    /// directory succeeds; a file in the way is an error.
    pub fn make_dir(&self, raw: &str) -> Result<(), FsError> {
        let canonical = path::normalize(raw);
        match route(&canonical) {
            Route::Archive(_) => Err(FsError::PermissionDenied),
            Route::Store(p) => {
                self.recurse_mkdir(p)?;
                self.invalidate_space();
                Ok(())
            }
        }
    }

    pub(crate) fn recurse_mkdir(&self, p: &str) -> Result<(), FsError> {
        if p.is_empty() || p == "/" {
            return Ok(());
        }
        match self.store.stat(p) {
            Ok(Metadata { is_dir: true, .. }) => return Ok(()),
            Ok(_) => return Err(StoreError::AlreadyExists.into()),
            Err(StoreError::NoEntry) => {}
            Err(e) => return Err(e.into()),
        }
        self.recurse_mkdir(path::parent(p))?;
        self.store.mkdir(p)?;
        Ok(())
    }

    /// Rename within the store, creating the destination's parents. Both
    /// endpoints must be outside the archive.
    pub fn move_(&self, from_raw: &str, to_raw: &str) -> Result<(), FsError> {
        let from = path::normalize(from_raw);
        let to = path::normalize(to_raw);
        if matches!(route(&from), Route::Archive(_)) || matches!(route(&to), Route::Archive(_)) {
            return Err(FsError::PermissionDenied);
        }
        self.recurse_mkdir(path::parent(&to))?;
        self.store.rename(&from, &to)?;
        self.invalidate_space();
        Ok(())
    }

    /// Recursive copy, either backend to the store. Every failure past the
    /// destination policy check, a missing source included, is reported as
    /// `CopyFailed`.
    pub fn copy(&self, from_raw: &str, to_raw: &str) -> Result<(), FsError> {
        let from = path::normalize(from_raw);
        let to = path::normalize(to_raw);
        if matches!(route(&to), Route::Archive(_)) {
            return Err(FsError::PermissionDenied);
        }
        let meta = self
            .stat_canonical(&from)
            .map_err(|_| FsError::CopyFailed)?;
        if meta.is_dir && (to == from || to.starts_with(&format!("{}/", from))) {
            return Err(FsError::CopyFailed);
        }
        self.copy_tree(&from, &to).map_err(|_| FsError::CopyFailed)?;
        self.invalidate_space();
        Ok(())
    }

    fn copy_tree(&self, from: &str, to: &str) -> Result<(), FsError> {
        let meta = self.stat_canonical(from)?;
        if meta.is_dir {
            self.recurse_mkdir(to)?;
            // Snapshot the children before descending so cursors are not
            // held across the recursion
            let children = self.list(from)?;
            for name in children {
                if from == "/" && name == "rom" {
                    continue;
                }
                let child_from = format!("{}/{}", from.trim_end_matches('/'), name);
                let child_to = format!("{}/{}", to.trim_end_matches('/'), name);
                self.copy_tree(&child_from, &child_to)?;
            }
            Ok(())
        } else {
            self.recurse_mkdir(path::parent(to))?;
            self.copy_file(from, to)
        }
    }

    fn copy_file(&self, from: &str, to: &str) -> Result<(), FsError> {
        match route(from) {
            Route::Archive(sub) => {
                let fd = self.archive.open(sub)?;
                let result: Result<(), FsError> = (|| {
                    let mut dst = self.store.open(to, OpenMode::Write)?;
                    let pumped = self.pump_archive(fd, &mut dst);
                    let closed = self.store.close(dst).map_err(FsError::from);
                    pumped.and(closed)
                })();
                let _ = self.archive.close(fd);
                result
            }
            Route::Store(p) => {
                let mut src = self.store.open(p, OpenMode::Read)?;
                let result: Result<(), FsError> = (|| {
                    let mut dst = self.store.open(to, OpenMode::Write)?;
                    let pumped = self.pump_store(&mut src, &mut dst);
                    let closed = self.store.close(dst).map_err(FsError::from);
                    pumped.and(closed)
                })();
                let _ = self.store.close(src);
                result
            }
        }
    }

    fn pump_archive(&self, fd: usize, dst: &mut S::File) -> Result<(), FsError> {
        let mut buf = [0u8; COPY_BUF];
        loop {
            let n = self.archive.read(fd, &mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.store.write(dst, &buf[..n])?;
        }
    }

    fn pump_store(&self, src: &mut S::File, dst: &mut S::File) -> Result<(), FsError> {
        let mut buf = [0u8; COPY_BUF];
        loop {
            let n = self.store.read(src, &mut buf)?;
            if n == 0 {
                return Ok(());
            }
            self.store.write(dst, &buf[..n])?;
        }
    }

    /// Delete a file or a whole subtree, children before parents.
    pub fn delete(&self, raw: &str) -> Result<(), FsError> {
        let canonical = path::normalize(raw);
        match route(&canonical) {
            Route::Archive(_) => Err(FsError::PermissionDenied),
            Route::Store(p) => {
                self.delete_tree(p)?;
                self.invalidate_space();
                Ok(())
            }
        }
    }

    fn delete_tree(&self, p: &str) -> Result<(), FsError> {
        let meta = self.store.stat(p)?;
        if meta.is_dir {
            let children = self.list(p)?;
            for name in children {
                if p == "/" && name == "rom" {
                    continue;
                }
                let child = format!("{}/{}", p.trim_end_matches('/'), name);
                self.delete_tree(&child)?;
            }
            if p != "/" {
                self.store.remove(p)?;
            }
        } else {
            self.store.remove(p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mount_tests.rs"]
mod mount_tests;
