//! Block device contract and the flash-backed adapter.
//!
//! The log-structured store sees storage as an array of uniform erase
//! blocks with four primitives: `read`, `prog`, `erase`, `sync`.
//! [`FlashBlockDevice`] implements that contract on top of [`FlashOps`],
//! mapping logical block N to a fixed physical window and wrapping every
//! program/erase in the safe-execution / cache-flush ritual.
//!
//! # Cache coherency
//!
//! An auxiliary cache mirrors flash contents into fast RAM. Once flash is
//! reprogrammed underneath it the mirror is stale, so before the *first*
//! program or erase after any `sync` the cache is flushed, and `sync`
//! re-establishes the caching path. The "cache live" flag is one-shot:
//! cleared by the flush, set again by `sync`.

use crate::flash::{CacheControl, FlashError, FlashOps, SafeExecutor, SECTOR_SIZE};

/// Geometry of the mutable store's flash window.
#[derive(Clone, Copy, Debug)]
pub struct BlockGeometry {
    /// Minimum read unit in bytes
    pub read_size: u32,
    /// Program unit in bytes
    pub prog_size: u32,
    /// Erase block size in bytes (a whole number of NOR sectors)
    pub block_size: u32,
    /// Number of logical blocks in the window
    pub block_count: u32,
    /// Physical byte offset of logical block 0, past the reserved
    /// firmware partitions
    pub base_offset: u32,
}

impl BlockGeometry {
    /// The production layout: a 1 MiB window of 4 KiB blocks starting 2 MiB
    /// into flash, after the firmware image and the archive partition.
    pub const fn firmware_default() -> Self {
        Self {
            read_size: 1,
            prog_size: 256,
            block_size: 4096,
            block_count: 256,
            base_offset: 512 * 4096,
        }
    }

    /// Physical byte offset of `block`.
    fn offset_of(&self, block: u32) -> u32 {
        self.base_offset + block * self.block_size
    }
}

/// The four primitives a log-structured flash filesystem expects.
pub trait BlockDevice {
    /// Read `buf.len()` bytes at `off` within logical `block`.
    fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Program `data` at `off` within logical `block`.
    fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Erase logical `block`.
    fn erase(&mut self, block: u32) -> Result<(), FlashError>;

    /// Flush device state after a batch of operations.
    fn sync(&mut self) -> Result<(), FlashError>;
}

/// Block device over a fixed window of physical flash.
pub struct FlashBlockDevice<F, E, C> {
    flash: F,
    exec: E,
    cache: C,
    geometry: BlockGeometry,
    /// Whether the auxiliary cache is currently serving reads. Cleared by
    /// the pre-program flush, set again by `sync`.
    cache_live: bool,
}

impl<F: FlashOps, E: SafeExecutor, C: CacheControl> FlashBlockDevice<F, E, C> {
    /// Create an adapter. The cache starts live: it has been serving reads
    /// since boot and must be flushed before the first program/erase.
    pub fn new(flash: F, exec: E, cache: C, geometry: BlockGeometry) -> Self {
        Self {
            flash,
            exec,
            cache,
            geometry,
            cache_live: true,
        }
    }

    /// The configured geometry.
    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    /// Access the underlying flash (test observation).
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Access the cache controller (test observation).
    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn check(&self, block: u32, off: u32, len: usize) -> Result<(), FlashError> {
        if block >= self.geometry.block_count {
            return Err(FlashError::OutOfRange);
        }
        let end = (off as usize).checked_add(len).ok_or(FlashError::OutOfRange)?;
        if end > self.geometry.block_size as usize {
            return Err(FlashError::OutOfRange);
        }
        Ok(())
    }
}

impl<F: FlashOps, E: SafeExecutor, C: CacheControl> BlockDevice for FlashBlockDevice<F, E, C> {
    fn read(&self, block: u32, off: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check(block, off, buf.len())?;
        self.flash.read(self.geometry.offset_of(block) + off, buf)
    }

    fn prog(&mut self, block: u32, off: u32, data: &[u8]) -> Result<(), FlashError> {
        self.check(block, off, data.len())?;
        if off % self.geometry.prog_size != 0 || data.len() as u32 % self.geometry.prog_size != 0 {
            return Err(FlashError::OutOfRange);
        }
        let addr = self.geometry.offset_of(block) + off;
        let Self {
            flash,
            exec,
            cache,
            cache_live,
            ..
        } = self;
        exec.run(&mut || {
            if *cache_live {
                cache.flush();
                *cache_live = false;
            }
            flash.program(addr, data)
        })
    }

    fn erase(&mut self, block: u32) -> Result<(), FlashError> {
        self.check(block, 0, 0)?;
        let base = self.geometry.offset_of(block);
        let sectors = self.geometry.block_size / SECTOR_SIZE;
        let Self {
            flash,
            exec,
            cache,
            cache_live,
            ..
        } = self;
        exec.run(&mut || {
            if *cache_live {
                cache.flush();
                *cache_live = false;
            }
            for i in 0..sectors {
                flash.erase_sector(base + i * SECTOR_SIZE)?;
            }
            Ok(())
        })
    }

    fn sync(&mut self) -> Result<(), FlashError> {
        self.cache.restore();
        self.cache_live = true;
        Ok(())
    }
}
