//! Collector algorithms, and the mutator side of the heap.
//!
//! A collector implements [`Collector`](crate::plan::global::Collector). Besides
//! its cycles it decides which barrier mutators run. Mutators allocate through
//! [`Mutator`](crate::plan::mutator_context::Mutator), which owns a TLAB, a barrier
//! and root handles, and asks the [`GCRequester`](crate::plan::gc_requester::GCRequester)
//! for a collection when an allocation fails.

pub mod barriers;
pub mod gc_requester;
mod gc_task;
pub mod generational;
pub mod global;
pub mod mutator_context;
pub mod nogc;
pub mod roots;

pub use self::barriers::{Barrier, BarrierSelector};
pub use self::gc_task::{GcCause, GcTask, Generation};
pub use self::global::{Collector, GcAlgorithm};
pub use self::mutator_context::{AllocationSemantics, Mutator};
pub use self::roots::{RootHandle, RootTable};
