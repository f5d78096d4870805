//! # rbuddy - A Binary Buddy Memory Allocator
//!
//! This crate provides a **buddy allocator** over a fixed, `mmap`-backed arena.
//! The arena is carved into power-of-two blocks that are split on allocation
//! and merged back with their buddy on free.
//!
//! ## Overview
//!
//! ```text
//!   Splitting a 4096 byte arena for a 128 byte request:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                               4096                                   │
//!   ├───────────────────────────────────┬──────────────────────────────────┤
//!   │               2048                │          2048 (free)             │
//!   ├─────────────────┬─────────────────┼──────────────────────────────────┤
//!   │      1024       │   1024 (free)   │                                  │
//!   ├────────┬────────┼─────────────────┤                                  │
//!   │  512   │  512 F │                 │                                  │
//!   ├────┬───┴────────┤                 │                                  │
//!   │256 │ 256 F      │      ...        │              ...                 │
//!   ├──┬─┴────────────┤                 │                                  │
//!   │A │ 128 F        │                 │                                  │
//!   └──┴──────────────┴─────────────────┴──────────────────────────────────┘
//!
//!   Every split keeps the first half and puts the second half (its buddy)
//!   on the free list of its order. Buddies differ in exactly one bit:
//!
//!       buddy(offset, order) = offset ^ (1 << order)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rbuddy
//!   ├── pow2       - upper_pow2! macro and order helpers
//!   ├── block      - Block (offset, order) arithmetic
//!   ├── bitmap     - one bit per minimum-size unit
//!   ├── free_list  - per-order free lists keyed by unit
//!   ├── region     - mmap-backed arena memory
//!   ├── config     - ArenaConfig
//!   ├── dump       - MemoryMap, the arena layout
//!   ├── error      - error types
//!   └── buddy      - BuddyAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rbuddy::BuddyAllocator;
//!
//! let mut allocator = BuddyAllocator::init(4096, 128).unwrap();
//!
//! let a = allocator.alloc(100).unwrap();
//! let b = allocator.alloc(128).unwrap();
//! assert_eq!("(128A)(128A)(256F)(512F)(1024F)(2048F)", allocator.dump().to_string());
//!
//! allocator.free(a).unwrap();
//! allocator.free(b).unwrap();
//! assert_eq!("(4096F)", allocator.dump().to_string());
//! ```
//!
//! ## How It Works
//!
//! No metadata is written into the arena. Allocated blocks are described by a
//! bitmap with one bit per minimum-size unit, where only the **last** unit of
//! an allocated block is set:
//!
//! ```text
//!   units   0   1   2   3   4   5   6   7
//!          ┌───┬───┬───┬───┬───────────────┐
//!   blocks │128│128│  256  │  512 (free)   │
//!          └───┴───┴───┴───┴───────────────┘
//!   bitmap   1   1   0   1   0   0   0   0
//! ```
//!
//! `free` only gets an offset, so it recovers the block size by probing the
//! bitmap at `start`, `start + 1`, `start + 3`, `start + 7`, ... until it hits
//! a set bit. Free blocks live on one list per order, with their headers kept
//! beside the arena rather than inside it.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed size**: The arena never grows after `init`
//! - **Partial free validation**: Double frees of a block start are caught,
//!   but an offset inside a larger allocated block can pass for a smaller one
//! - **Unix-only**: Requires `libc` and `mmap` (POSIX systems)

mod bitmap;
mod block;
mod buddy;
mod config;
mod dump;
mod error;
mod free_list;
pub mod pow2;
mod region;

pub use bitmap::Bitmap;
pub use block::Block;
pub use buddy::{BuddyAllocator, Offset};
pub use config::ArenaConfig;
pub use dump::{MemoryMap, Segment};
pub use error::{AllocError, ArenaInitError, ConfigError, FreeError};
