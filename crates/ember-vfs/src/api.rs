//! Native-binding surface for the scripting host.
//!
//! The host calls in with plain values and expects either pushed results or
//! a host-level throw. [`HostValue`] models the values crossing that
//! boundary, [`HostError`] a throw; both serialize to JSON for the
//! simulator's wire format. Thrown messages are `"<path>: <reason>"` for
//! path operations and the bare reason for handle sub-operations.
//!
//! Open handles live in an id-keyed table owned by [`FsApi`]; the host only
//! ever sees the numeric id.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::handle::{FileHandle, Mode};
use crate::mount::Mount;
use crate::path;
use crate::store::LogStore;
use crate::types::Whence;

/// Key into the open-handle table.
pub type HandleId = u32;

/// A value on the host's call stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<HostValue>),
    Table(Vec<(String, HostValue)>),
}

impl HostValue {
    pub fn to_json(&self) -> Result<String, HostError> {
        serde_json::to_string(self).map_err(|e| HostError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, HostError> {
        serde_json::from_str(json).map_err(|e| HostError(e.to_string()))
    }
}

/// A host-level throw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError(pub String);

impl core::fmt::Display for HostError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct OpenHandle<S: LogStore> {
    handle: FileHandle<S>,
    mode: Mode,
}

/// The `fs` API: one mounted filesystem pair plus the open-handle table.
pub struct FsApi<'a, S: LogStore> {
    mount: Mount<'a, S>,
    handles: BTreeMap<HandleId, OpenHandle<S>>,
    next_id: HandleId,
}

/// `"<path>: <reason>"`, with the canonical path.
fn throw_at(canonical: &str, e: &FsError) -> HostError {
    HostError(format!("{}: {}", canonical, e))
}

/// Bare reason, for handle sub-operations.
fn throw_bare(e: &FsError) -> HostError {
    HostError(format!("{}", e))
}

/// The host's string encoding is Latin-1: one byte per char.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

impl<'a, S: LogStore> FsApi<'a, S> {
    pub fn new(mount: Mount<'a, S>) -> Self {
        Self {
            mount,
            handles: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn mount(&self) -> &Mount<'a, S> {
        &self.mount
    }

    // ========== Path operations ==========

    pub fn list(&self, raw: &str) -> Result<HostValue, HostError> {
        let canonical = path::normalize(raw);
        let names = self
            .mount
            .list(raw)
            .map_err(|e| throw_at(&canonical, &e))?;
        Ok(HostValue::List(
            names.into_iter().map(HostValue::Str).collect(),
        ))
    }

    pub fn exists(&self, raw: &str) -> bool {
        self.mount.exists(raw)
    }

    pub fn is_dir(&self, raw: &str) -> bool {
        self.mount.is_dir(raw)
    }

    pub fn is_read_only(&self, raw: &str) -> bool {
        self.mount.is_read_only(raw)
    }

    pub fn get_name(&self, raw: &str) -> String {
        self.mount.get_name(raw)
    }

    pub fn get_drive(&self, raw: &str) -> String {
        String::from(self.mount.get_drive(raw))
    }

    pub fn get_size(&self, raw: &str) -> Result<i64, HostError> {
        let canonical = path::normalize(raw);
        self.mount
            .get_size(raw)
            .map(|n| n as i64)
            .map_err(|e| throw_at(&canonical, &e))
    }

    pub fn get_free_space(&self, raw: &str) -> Result<i64, HostError> {
        let canonical = path::normalize(raw);
        self.mount
            .get_free_space(raw)
            .map(|n| n as i64)
            .map_err(|e| throw_at(&canonical, &e))
    }

    pub fn get_capacity(&self, raw: &str) -> Result<i64, HostError> {
        let canonical = path::normalize(raw);
        self.mount
            .get_capacity(raw)
            .map(|n| n as i64)
            .map_err(|e| throw_at(&canonical, &e))
    }

    pub fn make_dir(&self, raw: &str) -> Result<(), HostError> {
        let canonical = path::normalize(raw);
        self.mount
            .make_dir(raw)
            .map_err(|e| throw_at(&canonical, &e))
    }

    /// Errors are reported against the source path.
    pub fn move_(&self, from: &str, to: &str) -> Result<(), HostError> {
        let canonical = path::normalize(from);
        self.mount
            .move_(from, to)
            .map_err(|e| throw_at(&canonical, &e))
    }

    /// A read-only destination is reported against `to`, everything else
    /// against `from`.
    pub fn copy(&self, from: &str, to: &str) -> Result<(), HostError> {
        self.mount.copy(from, to).map_err(|e| match e {
            FsError::PermissionDenied => throw_at(&path::normalize(to), &e),
            other => throw_at(&path::normalize(from), &other),
        })
    }

    pub fn delete(&self, raw: &str) -> Result<(), HostError> {
        let canonical = path::normalize(raw);
        self.mount.delete(raw).map_err(|e| throw_at(&canonical, &e))
    }

    pub fn combine(&self, base: &str, parts: &[&str]) -> String {
        path::combine(base, parts)
    }

    pub fn get_dir(&self, raw: &str) -> String {
        self.mount.get_dir(raw)
    }

    /// Attribute table, or `Nil` for a missing path.
    pub fn attributes(&self, raw: &str) -> HostValue {
        match self.mount.attributes(raw) {
            None => HostValue::Nil,
            Some(a) => HostValue::Table(alloc::vec![
                (String::from("size"), HostValue::Int(a.size as i64)),
                (String::from("isDir"), HostValue::Bool(a.is_dir)),
                (String::from("isReadOnly"), HostValue::Bool(a.is_read_only)),
                (
                    String::from("modification"),
                    HostValue::Int(a.modification as i64)
                ),
                (String::from("modified"), HostValue::Int(a.modified as i64)),
                (String::from("created"), HostValue::Int(a.created as i64)),
            ]),
        }
    }

    // ========== Handle table ==========

    /// Open a file. A malformed mode string throws; path-level failures are
    /// the soft `(nil, message)` convention, surfaced as `Err(message)` in
    /// the inner result.
    pub fn open(&mut self, raw: &str, mode_str: &str) -> Result<Result<HandleId, String>, HostError> {
        let mode = Mode::parse(mode_str)
            .map_err(|e| HostError(format!("{}: {}", mode_str, e)))?;
        let canonical = path::normalize(raw);
        match self.mount.open(raw, &mode) {
            Ok(handle) => {
                let id = self.next_id;
                self.next_id += 1;
                self.handles.insert(id, OpenHandle { handle, mode });
                Ok(Ok(id))
            }
            Err(e) => Ok(Err(format!("{}: {}", canonical, e))),
        }
    }

    fn entry(&mut self, id: HandleId) -> Result<(&Mount<'a, S>, &mut OpenHandle<S>), HostError> {
        let entry = self
            .handles
            .get_mut(&id)
            .ok_or_else(|| throw_bare(&FsError::BadHandle))?;
        if entry.handle.is_closed() {
            return Err(throw_bare(&FsError::BadHandle));
        }
        Ok((&self.mount, entry))
    }

    pub fn handle_read_all(&mut self, id: HandleId) -> Result<HostValue, HostError> {
        let (mount, entry) = self.entry(id)?;
        if entry.mode.writes() {
            return Err(HostError(String::from("file is not readable")));
        }
        let binary = entry.mode.binary;
        match entry.handle.read_all(mount).map_err(|e| throw_bare(&e))? {
            None => Ok(HostValue::Nil),
            Some(bytes) if binary => Ok(HostValue::Bytes(bytes)),
            Some(bytes) => Ok(HostValue::Str(decode_latin1(&bytes))),
        }
    }

    pub fn handle_read_line(
        &mut self,
        id: HandleId,
        with_newline: bool,
    ) -> Result<HostValue, HostError> {
        let (mount, entry) = self.entry(id)?;
        if entry.mode.writes() {
            return Err(HostError(String::from("file is not readable")));
        }
        let binary = entry.mode.binary;
        match entry
            .handle
            .read_line(mount, with_newline)
            .map_err(|e| throw_bare(&e))?
        {
            None => Ok(HostValue::Nil),
            Some(bytes) if binary => Ok(HostValue::Bytes(bytes)),
            Some(bytes) => Ok(HostValue::Str(decode_latin1(&bytes))),
        }
    }

    /// With a count, up to that many raw bytes; without one, a single
    /// character (text mode) or the next byte as an integer (binary mode).
    pub fn handle_read(
        &mut self,
        id: HandleId,
        count: Option<u64>,
    ) -> Result<HostValue, HostError> {
        let (mount, entry) = self.entry(id)?;
        if entry.mode.writes() {
            return Err(HostError(String::from("file is not readable")));
        }
        match count {
            Some(n) => match entry
                .handle
                .read(mount, n as usize)
                .map_err(|e| throw_bare(&e))?
            {
                None => Ok(HostValue::Nil),
                Some(bytes) => Ok(HostValue::Bytes(bytes)),
            },
            None => {
                let byte = entry.handle.read_byte(mount).map_err(|e| throw_bare(&e))?;
                match byte {
                    None => Ok(HostValue::Nil),
                    Some(b) if entry.mode.binary => Ok(HostValue::Int(b as i64)),
                    Some(b) => Ok(HostValue::Str(decode_latin1(&[b]))),
                }
            }
        }
    }

    /// Strings are written as Latin-1 bytes, integers as a single truncated
    /// byte, byte values verbatim.
    pub fn handle_write(&mut self, id: HandleId, value: &HostValue) -> Result<(), HostError> {
        let (mount, entry) = self.entry(id)?;
        if !entry.mode.writes() {
            return Err(HostError(String::from("file is not writable")));
        }
        let data = match value {
            HostValue::Str(s) => encode_latin1(s),
            HostValue::Int(n) => alloc::vec![*n as u8],
            HostValue::Bytes(b) => b.clone(),
            _ => return Err(HostError(String::from("bad argument to write"))),
        };
        entry.handle.write(mount, &data).map_err(|e| throw_bare(&e))
    }

    pub fn handle_write_line(&mut self, id: HandleId, value: &HostValue) -> Result<(), HostError> {
        self.handle_write(id, value)?;
        let (mount, entry) = self.entry(id)?;
        entry.handle.write(mount, b"\n").map_err(|e| throw_bare(&e))
    }

    pub fn handle_flush(&mut self, id: HandleId) -> Result<(), HostError> {
        let (mount, entry) = self.entry(id)?;
        entry.handle.flush(mount).map_err(|e| throw_bare(&e))
    }

    /// `whence` is one of `set`, `cur`, `end`.
    pub fn handle_seek(
        &mut self,
        id: HandleId,
        whence: &str,
        off: i64,
    ) -> Result<i64, HostError> {
        let origin = match whence {
            "set" => Whence::Start,
            "cur" => Whence::Current,
            "end" => Whence::End,
            other => return Err(HostError(format!("invalid option '{}'", other))),
        };
        let (mount, entry) = self.entry(id)?;
        entry
            .handle
            .seek(mount, origin, off)
            .map_err(|e| throw_bare(&e))
    }

    /// Close and drop the table entry.
    pub fn handle_close(&mut self, id: HandleId) -> Result<(), HostError> {
        let mut entry = self
            .handles
            .remove(&id)
            .ok_or_else(|| throw_bare(&FsError::BadHandle))?;
        entry
            .handle
            .close(&self.mount)
            .map_err(|e| throw_bare(&e))
    }
}
