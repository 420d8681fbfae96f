//! gengc is a generational, region-based garbage-collected heap for managed
//! language runtimes.
//!
//! The heap hands out objects from thread-local allocation buffers in eden,
//! collects the young generation with a parallel copying collector, and the
//! whole heap with a mark phase (optionally concurrent, with a
//! snapshot-at-the-beginning barrier) followed by sweeping or in-region
//! compaction. Cross-generational references are remembered with a card table.
//!
//! The runtime uses the heap through [`memory_manager`]:
//! * It builds a heap with a [`HeapBuilder`](heap::HeapBuilder) and
//!   [`memory_manager::gc_init`], registers its classes
//!   ([`vm::ClassInfo`]) and, optionally, a [`vm::Scanning`] implementation
//!   that enumerates the roots in its frames.
//! * Every thread binds a [`Mutator`](plan::Mutator), allocates through it, and
//!   stores references through its write barrier.
//! * Threads poll for safepoints, and mark themselves blocked around code
//!   that does not touch the heap.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

#[cfg(not(target_pointer_width = "64"))]
compile_error!("gengc only supports 64-bit targets");
static_assertions::assert_eq_size!(usize, u64);

#[cfg(not(unix))]
compile_error!("gengc reserves its heap with mmap and needs a unix target");

pub mod heap;
pub mod memory_manager;
pub mod object;
pub mod plan;
pub mod policy;
pub mod scheduler;
pub mod util;
pub mod vm;

#[cfg(test)]
mod tests;

pub use crate::heap::{HeapBuilder, HeapContext};
pub use crate::plan::{AllocationSemantics, GcCause, Generation, Mutator};
pub use crate::util::alloc::AllocationError;
