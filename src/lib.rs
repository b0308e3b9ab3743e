//! # arenalloc - Pluggable Fixed-Arena Allocation Strategies
//!
//! This crate manages one caller-supplied memory region with interchangeable
//! allocation strategies that all speak the same small contract, plus a
//! harness that picks a strategy at runtime and benchmarks it.
//!
//! ## Overview
//!
//! ```text
//!   Strategy Contract:
//!
//!   ┌──────────────┐   new(arena)   ┌─────────────────────────────────────┐
//!   │    Arena     │ ─────────────► │          AllocStrategy              │
//!   │ base, cap.   │                │  alloc(size)  -> Option<NonNull>    │
//!   └──────────────┘                │  free(ptr)                          │
//!                                   │  stats()      -> AllocatorStats     │
//!                                   │  drop         (destroy)             │
//!                                   └──────┬───────────┬───────────┬──────┘
//!                                          │           │           │
//!                                     ┌────┴───┐  ┌────┴────┐ ┌────┴────┐
//!                                     │ buddy  │  │best-fit │ │ system  │
//!                                     └────────┘  └─────────┘ └─────────┘
//!                                          + any library exporting the
//!                                            five C contract symbols
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── align      - Alignment macro (align!) and power-of-two helpers
//!   ├── arena      - Arena view and the mmap-backed MappedArena
//!   ├── block      - Tagged block state and the intrusive free list
//!   ├── strategy   - AllocStrategy trait and AllocatorStats
//!   ├── buddy      - BuddyAllocator
//!   ├── best_fit   - BestFitAllocator
//!   ├── system     - SystemAllocator (malloc passthrough)
//!   ├── plugin     - dlopen-based strategy libraries
//!   ├── registry   - Name-keyed strategy table and resolution
//!   ├── config     - HarnessConfig
//!   ├── bench      - Workload runner and BenchReport
//!   └── ffi        - C ABI exports (feature `ffi`)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{AllocStrategy, Arena, BuddyAllocator};
//!
//! let mut memory = vec![0u8; 1024];
//! let mut allocator = BuddyAllocator::new(Arena::from_slice(&mut memory)).unwrap();
//!
//! let block = allocator.alloc(100).unwrap();
//! unsafe {
//!     block.as_ptr().write_bytes(0x2A, 100);
//!     allocator.free(block.as_ptr());
//! }
//!
//! assert_eq!(allocator.stats().allocated, 0);
//! ```
//!
//! ## How It Works
//!
//! Both arena strategies keep their metadata inside the arena, in a header
//! right before each payload:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size / order    │  │  ┌──────────────────────────┐  │
//!   │  │ tag: FREE|LIVE  │  │  │                          │  │
//!   │  │ links|requested │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │                       │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! The tag decides how the last two header words are read: free-list links
//! while the block is free, the caller's requested length while it is live.
//! Headers are addressed by offset from the arena base and every access is
//! bounds-checked.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a handle has no synchronization; use one
//!   handle per arena per thread
//! - **Fixed arena**: an arena never grows after creation
//! - **Unix-only**: the harness maps arenas and loads strategies through `libc`
//!
//! ## Safety
//!
//! `free` is `unsafe`: the pointer must come from `alloc` on the same handle
//! and not be freed twice. The arena strategies detect both mistakes through
//! the header tags (panicking in debug builds, logging in release builds),
//! but the caller may still be holding a dangling pointer.

pub mod align;
pub mod arena;
pub mod bench;
pub mod best_fit;
mod block;
pub mod buddy;
pub mod config;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod plugin;
pub mod registry;
pub mod strategy;
pub mod system;

pub use arena::{Arena, MappedArena};
pub use bench::{BenchReport, Workload};
pub use best_fit::BestFitAllocator;
pub use block::{BlockInfo, BlockState};
pub use buddy::BuddyAllocator;
pub use config::HarnessConfig;
pub use error::{ArenaError, ConfigError, CreateError, HarnessError, PluginError};
pub use plugin::{Plugin, PluginStrategy};
pub use registry::Registry;
pub use strategy::{AllocStrategy, AllocatorStats};
pub use system::SystemAllocator;
