//! Demand-paged virtual memory over a single address space.
//!
//! An [`Mmu`] translates 32-bit virtual addresses into frames of a fixed
//! physical pool, faults pages in from a [`BackingStore`] on first touch and
//! evicts the least recently used page (writing it back if dirty) once every
//! frame is committed.
//!
//! The engine is single-threaded. Share it behind an exclusive lock held for
//! the whole of each `read`/`write` call.

pub mod backing_store;
pub mod error;
pub mod event;
pub mod frame_pool;
pub mod mmu;
pub mod page_replacer;
pub mod page_table;

pub use backing_store::{BackingStore, MemoryBackingStore};
pub use error::{InvariantViolation, Result, StoreOp, VmError};
pub use event::{Access, PagingEvent, PagingObserver};
pub use mmu::{DefaultMmu, Mmu, MmuStats};
pub use page_replacer::{LruPageReplacer, PageReplacer};

/// Index of a virtual page, `address / PAGE_SIZE`.
pub type PageNumber = usize;

/// Index of a physical frame slot.
pub type FrameIndex = usize;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_FRAME_COUNT: usize = 128;
pub const DEFAULT_PAGE_COUNT: usize = 256;
