//! Ember Flash Hardware Abstraction Layer
//!
//! This crate sits between the log-structured flash filesystem and the
//! physical NOR flash chip:
//!
//! - **flash**: raw chip primitives (read / program / erase), the safe
//!   execution window, and the auxiliary cache control hooks
//! - **block**: the block-device contract the log-structured store consumes,
//!   plus the adapter that maps logical blocks onto a fixed window of
//!   physical flash
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              log-structured store (external)             │
//! └──────────────────────────┬───────────────────────────────┘
//!                            │ BlockDevice
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    FlashBlockDevice                      │
//! │  • logical block -> physical offset window               │
//! │  • cache flush ritual before first program/erase         │
//! │  • every program/erase inside a safe execution window    │
//! └───────┬──────────────────┬───────────────────┬───────────┘
//!         │ FlashOps         │ SafeExecutor      │ CacheControl
//!         ▼                  ▼                   ▼
//!    NOR flash chip     scheduler pause     XIP cache hardware
//! ```
//!
//! The flash bus cannot service reads (including code fetches) while a
//! program or erase is in flight, so those two operations always run inside
//! a system-wide safe execution window obtained from [`SafeExecutor`].

#![no_std]
extern crate alloc;

pub mod block;
pub mod flash;

pub use block::{BlockDevice, BlockGeometry, FlashBlockDevice};
pub use flash::{CacheControl, FlashError, FlashOps, SafeExecutor};
pub use flash::{CountingCache, InlineExecutor, RamFlash};
