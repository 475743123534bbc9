//! RAM-backed [`LogStore`] for the simulator and the test suite.
//!
//! Nodes live in a path-keyed `BTreeMap` behind a `RefCell`; keys are
//! canonical (`/a/b`) so map order is byte order and directory listings come
//! out sorted for free. Geometry is fixed at 4 KiB x 256 blocks so the
//! free-space arithmetic in the router is observable: a file occupies
//! `ceil(len / block_size)` blocks and a directory occupies one.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::error::StoreError;
use crate::store::{LogStore, StoreStats};
use crate::types::{EntryInfo, Metadata, OpenMode, Whence};

const BLOCK_SIZE: u64 = 4096;
const BLOCK_COUNT: u64 = 256;

enum Node {
    File(Vec<u8>),
    Dir,
}

/// In-memory log store. The root directory always exists and is not a map
/// entry.
pub struct MemoryStore {
    nodes: RefCell<BTreeMap<String, Node>>,
    fail_next_mount: Cell<bool>,
}

/// Open-file state: reads and writes go back through the store so every
/// handle sees the current content.
#[derive(Debug)]
pub struct MemFile {
    path: String,
    pos: u64,
    mode: OpenMode,
}

/// Directory iteration state: a snapshot taken at open time.
pub struct MemDir {
    entries: Vec<EntryInfo>,
    index: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(BTreeMap::new()),
            fail_next_mount: Cell::new(false),
        }
    }

    /// Make the next `mount` call fail, exercising the format-and-remount
    /// path of the router constructor.
    pub fn fail_next_mount(&self) {
        self.fail_next_mount.set(true);
    }

    /// Canonical map key: leading separator, no trailing separator, root is
    /// `"/"`.
    fn key(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            String::from("/")
        } else {
            format!("/{}", trimmed)
        }
    }

    fn parent_key(key: &str) -> &str {
        match key.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &key[..idx],
        }
    }

    fn leaf(key: &str) -> &str {
        match key.rfind('/') {
            Some(idx) => &key[idx + 1..],
            None => key,
        }
    }

    /// Parent must exist and be a directory before a node is created.
    fn check_parent(nodes: &BTreeMap<String, Node>, key: &str) -> Result<(), StoreError> {
        let parent = Self::parent_key(key);
        if parent == "/" {
            return Ok(());
        }
        match nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(StoreError::NotADirectory),
            None => Err(StoreError::NoEntry),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore for MemoryStore {
    type File = MemFile;
    type Dir = MemDir;

    fn mount(&self) -> Result<(), StoreError> {
        if self.fail_next_mount.replace(false) {
            return Err(StoreError::Corrupt);
        }
        Ok(())
    }

    fn format(&self) -> Result<(), StoreError> {
        self.nodes.borrow_mut().clear();
        Ok(())
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<MemFile, StoreError> {
        let key = Self::key(path);
        let mut nodes = self.nodes.borrow_mut();
        let existing = match nodes.get(&key) {
            Some(Node::Dir) => return Err(StoreError::IsADirectory),
            Some(Node::File(data)) => Some(data.len() as u64),
            None => None,
        };
        let pos = match (existing, mode) {
            (Some(_), OpenMode::Read) => 0,
            (Some(_), OpenMode::Write) => {
                nodes.insert(key.clone(), Node::File(Vec::new()));
                0
            }
            (Some(len), OpenMode::Append) => len,
            (None, OpenMode::Read) => return Err(StoreError::NoEntry),
            (None, _) => {
                Self::check_parent(&nodes, &key)?;
                nodes.insert(key.clone(), Node::File(Vec::new()));
                0
            }
        };
        Ok(MemFile {
            path: key,
            pos,
            mode,
        })
    }

    fn read(&self, file: &mut MemFile, buf: &mut [u8]) -> Result<usize, StoreError> {
        let nodes = self.nodes.borrow();
        let data = match nodes.get(&file.path) {
            Some(Node::File(data)) => data,
            _ => return Err(StoreError::NoEntry),
        };
        if file.pos >= data.len() as u64 {
            return Ok(0);
        }
        let start = file.pos as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&self, file: &mut MemFile, data: &[u8]) -> Result<usize, StoreError> {
        let mut nodes = self.nodes.borrow_mut();
        let content = match nodes.get_mut(&file.path) {
            Some(Node::File(content)) => content,
            _ => return Err(StoreError::NoEntry),
        };
        if file.mode == OpenMode::Append {
            file.pos = content.len() as u64;
        }
        let end = file.pos as usize + data.len();
        if end as u64 > BLOCK_SIZE * BLOCK_COUNT {
            return Err(StoreError::NoSpace);
        }
        if content.len() < end {
            content.resize(end, 0);
        }
        let start = file.pos as usize;
        content[start..end].copy_from_slice(data);
        file.pos = end as u64;
        Ok(data.len())
    }

    fn seek(&self, file: &mut MemFile, whence: Whence, off: i64) -> Result<u64, StoreError> {
        let size = self.size(file)? as i64;
        let target = match whence {
            Whence::Start => off,
            Whence::Current => file.pos as i64 + off,
            Whence::End => size + off,
        };
        if target < 0 {
            return Err(StoreError::io("Invalid argument"));
        }
        file.pos = target as u64;
        Ok(file.pos)
    }

    fn tell(&self, file: &mut MemFile) -> Result<u64, StoreError> {
        Ok(file.pos)
    }

    fn size(&self, file: &mut MemFile) -> Result<u64, StoreError> {
        let nodes = self.nodes.borrow();
        match nodes.get(&file.path) {
            Some(Node::File(data)) => Ok(data.len() as u64),
            _ => Err(StoreError::NoEntry),
        }
    }

    fn sync(&self, _file: &mut MemFile) -> Result<(), StoreError> {
        Ok(())
    }

    fn close(&self, _file: MemFile) -> Result<(), StoreError> {
        Ok(())
    }

    fn open_dir(&self, path: &str) -> Result<MemDir, StoreError> {
        let key = Self::key(path);
        let nodes = self.nodes.borrow();
        if key != "/" {
            match nodes.get(&key) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(StoreError::NotADirectory),
                None => return Err(StoreError::NoEntry),
            }
        }
        let prefix = if key == "/" { String::new() } else { key };
        let entries = nodes
            .iter()
            .filter(|(k, _)| {
                k.starts_with(&prefix)
                    && k.len() > prefix.len()
                    && k.as_bytes()[prefix.len()] == b'/'
                    && !k[prefix.len() + 1..].contains('/')
            })
            .map(|(k, node)| EntryInfo {
                name: String::from(Self::leaf(k)),
                is_dir: matches!(node, Node::Dir),
                size: match node {
                    Node::File(data) => data.len() as u64,
                    Node::Dir => 0,
                },
            })
            .collect();
        Ok(MemDir { entries, index: 0 })
    }

    fn read_dir(&self, dir: &mut MemDir) -> Result<Option<EntryInfo>, StoreError> {
        let entry = dir.entries.get(dir.index).cloned();
        if entry.is_some() {
            dir.index += 1;
        }
        Ok(entry)
    }

    fn close_dir(&self, _dir: MemDir) -> Result<(), StoreError> {
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Metadata, StoreError> {
        let key = Self::key(path);
        if key == "/" {
            return Ok(Metadata {
                is_dir: true,
                size: 0,
            });
        }
        let nodes = self.nodes.borrow();
        match nodes.get(&key) {
            Some(Node::Dir) => Ok(Metadata {
                is_dir: true,
                size: 0,
            }),
            Some(Node::File(data)) => Ok(Metadata {
                is_dir: false,
                size: data.len() as u64,
            }),
            None => Err(StoreError::NoEntry),
        }
    }

    fn mkdir(&self, path: &str) -> Result<(), StoreError> {
        let key = Self::key(path);
        if key == "/" {
            return Err(StoreError::AlreadyExists);
        }
        let mut nodes = self.nodes.borrow_mut();
        if nodes.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        Self::check_parent(&nodes, &key)?;
        nodes.insert(key, Node::Dir);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let key = Self::key(path);
        if key == "/" {
            return Err(StoreError::io("Invalid argument"));
        }
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(&key) {
            Some(Node::Dir) => {
                let child_prefix = format!("{}/", key);
                if nodes.keys().any(|k| k.starts_with(&child_prefix)) {
                    return Err(StoreError::NotEmpty);
                }
            }
            Some(Node::File(_)) => {}
            None => return Err(StoreError::NoEntry),
        }
        nodes.remove(&key);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let from_key = Self::key(from);
        let to_key = Self::key(to);
        if from_key == to_key {
            return Ok(());
        }
        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(&from_key) {
            return Err(StoreError::NoEntry);
        }
        if nodes.contains_key(&to_key) {
            return Err(StoreError::AlreadyExists);
        }
        Self::check_parent(&nodes, &to_key)?;
        let node = match nodes.remove(&from_key) {
            Some(node) => node,
            None => return Err(StoreError::NoEntry),
        };
        if let Node::Dir = node {
            // Rekey the whole subtree
            let child_prefix = format!("{}/", from_key);
            let moved: Vec<String> = nodes
                .keys()
                .filter(|k| k.starts_with(&child_prefix))
                .cloned()
                .collect();
            for old in moved {
                if let Some(child) = nodes.remove(&old) {
                    let new = format!("{}{}", to_key, &old[from_key.len()..]);
                    nodes.insert(new, child);
                }
            }
        }
        nodes.insert(to_key, node);
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let nodes = self.nodes.borrow();
        let used_blocks = nodes
            .values()
            .map(|node| match node {
                Node::File(data) => (data.len() as u64).div_ceil(BLOCK_SIZE),
                Node::Dir => 1,
            })
            .sum();
        Ok(StoreStats {
            block_size: BLOCK_SIZE,
            block_count: BLOCK_COUNT,
            used_blocks,
        })
    }
}
