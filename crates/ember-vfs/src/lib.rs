//! Ember Virtual Filesystem Layer
//!
//! A single unified namespace over two heterogeneous stores:
//!
//! - **archive**: an immutable, memory-mapped image baked into firmware,
//!   mounted read-only at `/rom`
//! - **store**: a log-structured flash filesystem serving every writable path
//!
//! Modules:
//!
//! - **path**: canonicalization of arbitrary input paths
//! - **archive**: reader for the packed read-only image (binary-search
//!   directory lookup, fixed descriptor pools)
//! - **store**: the call surface of the external log-structured store
//! - **memory**: RAM-backed store implementation for tests and the simulator
//! - **mount**: backend routing, read-only policy, recursive tree operations
//! - **handle**: the tagged file handle unifying both backends
//! - **api**: the native-binding surface exposed to the scripting host
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    scripting host (external)                 │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ FsApi (push / throw boundary)
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Mount                               │
//! │  • path normalization     • /rom read-only policy            │
//! │  • backend routing        • recursive copy / delete / mkdir  │
//! │  • free-space cache       • merged directory listings        │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │                               │
//!                ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │      Archive reader      │   │   LogStore (external lib)    │
//! │  memory-mapped, sorted   │   │   log-structured flash fs    │
//! │  entries, binary search  │   │   over ember-hal blocks      │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Single caller**: the scripting host invokes everything synchronously
//!    from one execution context; interior mutability (`RefCell`/`Cell`)
//!    replaces locking.
//! 2. **Bounded resources**: archive descriptors and directory cursors come
//!    from fixed pools; exhaustion is an error, not an allocation.
//! 3. **Explicit context**: the [`mount::Mount`] value is created once at
//!    boot and passed to every operation; there are no ambient globals.

#![no_std]
extern crate alloc;

pub mod api;
pub mod archive;
pub mod error;
pub mod handle;
pub mod memory;
pub mod mount;
pub mod path;
pub mod store;
pub mod types;

// Re-export main types
pub use api::{FsApi, HandleId, HostError, HostValue};
pub use archive::Archive;
pub use error::{FsError, StoreError};
pub use handle::{FileHandle, Mode};
pub use memory::MemoryStore;
pub use mount::Mount;
pub use path::{combine, file_name, normalize, parent};
pub use store::{LogStore, StoreStats};
pub use types::{Attributes, EntryInfo, Metadata, OpenMode, SpaceInfo, Whence};
