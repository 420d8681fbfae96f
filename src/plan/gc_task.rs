use std::fmt;
use strum_macros::{Display, EnumString};

/// Why a collection was requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum GcCause {
    /// An allocation could not be satisfied.
    AllocFailure,
    /// Heap occupancy crossed the trigger's target footprint.
    HeapThreshold,
    /// Registered native allocations crossed the watermark.
    NativeAlloc,
    /// A periodic hint from the controller thread.
    Periodic,
    /// The process is about to fork. Compacts the whole heap.
    ForkPrepare,
    /// Requested by the runtime or the program.
    Explicit,
    /// The last attempt before reporting out of memory.
    OutOfMemory,
}

impl GcCause {
    /// Background causes are coalesced: at most one task per cause is queued or running.
    pub fn is_background(self) -> bool {
        matches!(
            self,
            GcCause::HeapThreshold | GcCause::NativeAlloc | GcCause::Periodic
        )
    }

    /// Tasks with these causes always run, even if another cycle completed since the request.
    pub fn is_mandatory(self) -> bool {
        matches!(self, GcCause::Explicit | GcCause::ForkPrepare)
    }
}

/// What a cycle collects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
pub enum Generation {
    Young,
    Full,
}

/// A queued collection request.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct GcTask {
    pub cause: GcCause,
    pub generation: Generation,
    pub(crate) ticket: u64,
    /// Completed cycle counters when the task was (last) requested.
    pub(crate) cycles_at_request: u64,
    pub(crate) full_cycles_at_request: u64,
}

impl fmt::Debug for GcTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GcTask#{}({}, {})", self.ticket, self.cause, self.generation)
    }
}
