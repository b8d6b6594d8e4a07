//! # kheap - Kernel Heap Manager
//!
//! This crate provides the **first-fit heap** a small kernel uses for all of
//! its dynamic memory, including the page-aligned allocations needed for
//! paging structures.
//!
//! ## Overview
//!
//! The heap is handed one contiguous region at boot. Every piece of that
//! region belongs to exactly one block, and every block starts with a header:
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ prev / next     │  │  │                          │  │
//!   │  │ tag: 0xAF00BEA8 │  │  │     N bytes usable       │  │
//!   │  │ used: 0 / 1     │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      32 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to caller
//! ```
//!
//! Free blocks are chained through `prev`/`next` in address order. An
//! allocation takes the first free block that is large enough:
//!
//! ```text
//!   size <= S < size + H     grant the whole block
//!   S >= size + H            split, the upper part stays free
//!
//!   ┌────┬──────────┐        ┌────┬──────┬────┬───┐
//!   │ H  │    S     │  ───▶  │ H  │ size │ H  │ … │
//!   └────┴──────────┘        └────┴──────┴────┴───┘
//! ```
//!
//! A page-aligned request first leaves a free filler at the bottom of the
//! block so that the next payload starts on a page boundary:
//!
//! ```text
//!   ┌────┬────────┬────┬──────────────┬────┬─────┐
//!   │ H  │ filler │ H  │ size         │ H  │ …   │
//!   └────┴────────┴────┴──────────────┴────┴─────┘
//!                      ▲
//!                      └── multiple of PAGE_SIZE
//! ```
//!
//! Releasing a block puts it back in order and merges it with any free
//! neighbour it touches, until nothing is left to merge.
//!
//! ## Crate Structure
//!
//! ```text
//!   kheap
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── config     - Size ceiling, page size, header tag
//!   ├── error      - HeapError
//!   ├── block      - Block header (internal)
//!   ├── arena      - Bounds-checked header access by offset (internal)
//!   ├── free_list  - Address-ordered free list (internal)
//!   ├── heap       - Heap: allocate / release
//!   ├── split      - Plain and page-aligned splitting (internal)
//!   ├── coalesce   - Reinsertion and merging (internal)
//!   ├── event      - Log backlog, emitted outside the lock (internal)
//!   ├── stats      - HeapStats, block walk, integrity check
//!   ├── locked     - LockedHeap, GlobalAlloc, the kernel heap
//!   └── host       - mmap-backed regions (feature `host`)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! // Once, during boot.
//! unsafe { kheap::initialize(heap_start, heap_len) };
//!
//! let table = kheap::allocate(4096, true)?;
//! // ...
//! kheap::release(table.as_ptr())?;
//! ```
//!
//! ## Features
//!
//! - `host`: [`host::MappedRegion`], an `mmap`-backed region for running the
//!   heap in a normal process
//! - `global`: registers [`KERNEL_HEAP`] as the `#[global_allocator]`. Only
//!   for kernel images that call [`initialize`] before anything allocates; a
//!   hosted binary or test harness allocates earlier and aborts
//!
//! ## Logging
//!
//! The heap reports through the `log` facade, but never while its lock is
//! held. Events are kept in a small backlog and logged after the lock is
//! released, so a logger that formats into the heap does not deadlock.
//!
//! ## Limitations
//!
//! - **One region**: the heap never grows or gives memory back
//! - **Coarse locking**: one spin lock per heap, held for a whole call
//! - **No reentrancy**: calling into a heap while it is locked deadlocks
//!
//! ## Safety
//!
//! The heap trusts the region it is given. Headers are only read after their
//! tag has been checked, and every header access is bounds-checked against
//! the region, but a caller scribbling over payload boundaries can still
//! break blocks it does not own.

#![cfg_attr(not(test), no_std)]

pub mod align;
mod arena;
mod block;
mod coalesce;
pub mod config;
mod error;
mod event;
mod free_list;
mod heap;
#[cfg(any(test, feature = "host"))]
pub mod host;
mod locked;
mod split;
mod stats;

pub use block::HEADER_SIZE;
pub use error::HeapError;
pub use heap::Heap;
pub use locked::{KERNEL_HEAP, LockedHeap, allocate, initialize, release, stats};
pub use stats::{BlockInfo, Blocks, HeapStats};
