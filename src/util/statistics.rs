//! GC statistics.

use crate::util::heap::{RegionPool, SpaceType};
use enum_map::EnumMap;
use itertools::Itertools;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters updated by the collector and the heap manager. Everything is a relaxed
/// atomic: the numbers are for diagnostics and tests, not for synchronization.
#[derive(Default)]
pub struct GcStats {
    young_gcs: AtomicUsize,
    full_gcs: AtomicUsize,
    objects_copied: AtomicUsize,
    bytes_copied: AtomicUsize,
    objects_promoted: AtomicUsize,
    bytes_promoted: AtomicUsize,
    evacuation_failures: AtomicUsize,
    regions_released: AtomicUsize,
    bytes_allocated: AtomicUsize,
    pauses: AtomicUsize,
    pause_total_ns: AtomicU64,
    pause_max_ns: AtomicU64,
    allocations_during_pause: AtomicUsize,
    concurrent_marks_aborted: AtomicUsize,
    references_cleared: AtomicUsize,
    objects_pinned: AtomicUsize,
}

macro_rules! counter {
    ($(#[$meta:meta])* $inc:ident, $field:ident) => {
        $(#[$meta])*
        pub fn $inc(&self, n: usize) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl GcStats {
    counter!(young_gc_done, young_gcs);
    counter!(full_gc_done, full_gcs);
    counter!(
        /// Objects copied to survivor space by young GCs.
        copied,
        objects_copied
    );
    counter!(copied_bytes, bytes_copied);
    counter!(
        /// Objects copied (or promoted in place) to tenured space.
        promoted,
        objects_promoted
    );
    counter!(promoted_bytes, bytes_promoted);
    counter!(evacuation_failed, evacuation_failures);
    counter!(released_regions, regions_released);
    counter!(allocated_bytes, bytes_allocated);
    counter!(
        /// A mutator allocated while the world was stopped. Must stay zero.
        allocation_during_pause,
        allocations_during_pause
    );
    counter!(concurrent_mark_aborted, concurrent_marks_aborted);
    counter!(
        /// Weak referents cleared by full GCs.
        cleared_references,
        references_cleared
    );
    counter!(
        /// Pinned young objects kept in place by young GCs.
        kept_pinned,
        objects_pinned
    );

    pub fn record_pause(&self, pause: Duration) {
        let ns = pause.as_nanos() as u64;
        self.pauses.fetch_add(1, Ordering::Relaxed);
        self.pause_total_ns.fetch_add(ns, Ordering::Relaxed);
        self.pause_max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn gc_count(&self) -> usize {
        self.young_gcs.load(Ordering::Relaxed) + self.full_gcs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, pool: &RegionPool) -> GcStatsSnapshot {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        GcStatsSnapshot {
            young_gcs: load(&self.young_gcs),
            full_gcs: load(&self.full_gcs),
            objects_copied: load(&self.objects_copied),
            bytes_copied: load(&self.bytes_copied),
            objects_promoted: load(&self.objects_promoted),
            bytes_promoted: load(&self.bytes_promoted),
            evacuation_failures: load(&self.evacuation_failures),
            regions_released: load(&self.regions_released),
            bytes_allocated: load(&self.bytes_allocated),
            pauses: load(&self.pauses),
            pause_total: Duration::from_nanos(self.pause_total_ns.load(Ordering::Relaxed)),
            pause_max: Duration::from_nanos(self.pause_max_ns.load(Ordering::Relaxed)),
            allocations_during_pause: load(&self.allocations_during_pause),
            concurrent_marks_aborted: load(&self.concurrent_marks_aborted),
            references_cleared: load(&self.references_cleared),
            objects_pinned: load(&self.objects_pinned),
            regions: EnumMap::from_fn(|space| pool.regions_in(space)),
        }
    }
}

/// A copy of the counters at one point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcStatsSnapshot {
    pub young_gcs: usize,
    pub full_gcs: usize,
    pub objects_copied: usize,
    pub bytes_copied: usize,
    pub objects_promoted: usize,
    pub bytes_promoted: usize,
    pub evacuation_failures: usize,
    pub regions_released: usize,
    pub bytes_allocated: usize,
    pub pauses: usize,
    pub pause_total: Duration,
    pub pause_max: Duration,
    pub allocations_during_pause: usize,
    pub concurrent_marks_aborted: usize,
    pub references_cleared: usize,
    pub objects_pinned: usize,
    /// Regions per space.
    pub regions: EnumMap<SpaceType, usize>,
}

impl GcStatsSnapshot {
    pub fn gc_count(&self) -> usize {
        self.young_gcs + self.full_gcs
    }
}

impl fmt::Display for GcStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "young={} full={} copied={}B promoted={}B cleared={} pauses={} (max {:?}) regions: {}",
            self.young_gcs,
            self.full_gcs,
            self.bytes_copied,
            self.bytes_promoted,
            self.references_cleared,
            self.pauses,
            self.pause_max,
            self.regions
                .iter()
                .map(|(space, n)| format!("{}={}", space, n))
                .join(" ")
        )
    }
}
