//! Raw flash primitives and system coordination hooks.
//!
//! Three small traits describe everything the block adapter needs from the
//! rest of the system:
//!
//! - [`FlashOps`]: the NOR chip itself (byte reads, page programs, sector
//!   erases against absolute offsets)
//! - [`SafeExecutor`]: a system-wide pause of other execution contexts for
//!   the duration of a program/erase
//! - [`CacheControl`]: the auxiliary RAM cache that mirrors flash contents
//!   and goes stale when flash is rewritten underneath it
//!
//! Test doubles for all three live at the bottom of the module.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;

/// NOR erase granularity in bytes.
pub const SECTOR_SIZE: u32 = 4096;

/// NOR program granularity in bytes.
pub const PAGE_SIZE: u32 = 256;

/// Errors from the flash layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlashError {
    /// Offset or length falls outside the device or violates alignment
    OutOfRange,
    /// A safe execution window could not be obtained in time
    Timeout,
    /// Underlying transport failure
    Io(String),
}

impl FlashError {
    /// Create an I/O error with message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlashError::OutOfRange => write!(f, "flash offset out of range"),
            FlashError::Timeout => write!(f, "safe execution window timed out"),
            FlashError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

/// Raw NOR flash chip operations.
///
/// Offsets are absolute byte offsets from the start of the chip. Program and
/// erase must only be invoked from inside a safe execution window; callers
/// (the block adapter) are responsible for that.
pub trait FlashOps {
    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` starting at `offset`. `offset` and `data.len()` must
    /// be multiples of [`PAGE_SIZE`]. Programming only clears bits; the
    /// target range must have been erased first.
    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase the [`SECTOR_SIZE`] sector starting at `offset` (which must be
    /// sector-aligned), setting it to all `0xFF`.
    fn erase_sector(&mut self, offset: u32) -> Result<(), FlashError>;
}

/// System-wide safe execution window.
///
/// While the flash chip is being programmed it cannot service reads, and the
/// CPU may be executing code from that same chip. Implementations park every
/// other execution context (the scheduler, the second core, pending
/// interrupts) before running `op` and resume them afterwards. A window that
/// cannot be obtained is a [`FlashError::Timeout`]; the operation is never
/// retried here.
pub trait SafeExecutor {
    /// Run `op` with all other execution contexts paused.
    fn run(&self, op: &mut dyn FnMut() -> Result<(), FlashError>) -> Result<(), FlashError>;
}

/// Auxiliary cache that mirrors flash contents into fast RAM.
///
/// After flash contents change underneath it the cache serves stale data
/// until explicitly flushed (a forced read-through of its address range).
pub trait CacheControl {
    /// Force the cache to drop its mirrored contents.
    fn flush(&mut self);

    /// Re-establish the caching path after flash operations are done.
    fn restore(&mut self);
}

// ========== Test doubles ==========

/// RAM-backed flash chip with NOR semantics.
///
/// Programming ANDs bytes into place (bits can only be cleared); erasing
/// fills a sector with `0xFF`. Used by the block adapter tests and the
/// firmware simulator.
pub struct RamFlash {
    data: Vec<u8>,
}

impl RamFlash {
    /// Create an erased chip of `size` bytes (must be sector-aligned).
    pub fn new(size: u32) -> Self {
        Self {
            data: vec![0xFF; size as usize],
        }
    }

    /// Direct view of the chip contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<(), FlashError> {
        let end = (offset as usize).checked_add(len).ok_or(FlashError::OutOfRange)?;
        if end > self.data.len() {
            return Err(FlashError::OutOfRange);
        }
        Ok(())
    }
}

impl FlashOps for RamFlash {
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check_range(offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), FlashError> {
        if offset % PAGE_SIZE != 0 || data.len() as u32 % PAGE_SIZE != 0 {
            return Err(FlashError::OutOfRange);
        }
        self.check_range(offset, data.len())?;
        let start = offset as usize;
        for (dst, src) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        Ok(())
    }

    fn erase_sector(&mut self, offset: u32) -> Result<(), FlashError> {
        if offset % SECTOR_SIZE != 0 {
            return Err(FlashError::OutOfRange);
        }
        self.check_range(offset, SECTOR_SIZE as usize)?;
        let start = offset as usize;
        self.data[start..start + SECTOR_SIZE as usize].fill(0xFF);
        Ok(())
    }
}

/// Executor that runs the operation immediately, counting windows opened.
#[derive(Default)]
pub struct InlineExecutor {
    windows: Cell<u32>,
}

impl InlineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of safe execution windows opened so far.
    pub fn windows(&self) -> u32 {
        self.windows.get()
    }
}

impl SafeExecutor for InlineExecutor {
    fn run(&self, op: &mut dyn FnMut() -> Result<(), FlashError>) -> Result<(), FlashError> {
        self.windows.set(self.windows.get() + 1);
        op()
    }
}

/// Cache control that records flush/restore calls.
#[derive(Default)]
pub struct CountingCache {
    flushes: u32,
    restores: u32,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    pub fn restores(&self) -> u32 {
        self.restores
    }
}

impl CacheControl for CountingCache {
    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn restore(&mut self) {
        self.restores += 1;
    }
}
