use crate::plan::Generation;
use crate::util::constants::BYTES_IN_MBYTE;
use crate::util::options::{GCTriggerSelector, Options};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A snapshot of heap occupancy handed to the trigger policy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapUsage {
    /// Bytes in regions that are not free.
    pub used_bytes: usize,
    /// The heap budget.
    pub total_bytes: usize,
    /// Bytes in young regions.
    pub young_bytes: usize,
}

/// GCTrigger decides when a background GC is due. Allocation failures always
/// collect; the policy only adds collections on top of those.
pub struct GCTrigger {
    pub policy: Box<dyn GCTriggerPolicy>,
}

impl GCTrigger {
    pub fn new(options: &Options) -> Self {
        let total = *options.heap_size;
        GCTrigger {
            policy: match options.gc_trigger {
                GCTriggerSelector::FixedHeapSize => Box::new(FixedHeapSizeTrigger),
                GCTriggerSelector::HeapThreshold => Box::new(HeapThresholdTrigger::new(total)),
                GCTriggerSelector::Adaptive => Box::new(AdaptiveHeapTrigger::new(total)),
                GCTriggerSelector::NthAlloc(n) => Box::new(NthAllocTrigger::new(n)),
                GCTriggerSelector::Never => Box::new(NeverTrigger),
            },
        }
    }

    /// Called whenever the heap manager acquires a region or a TLAB.
    pub fn poll(&self, usage: &HeapUsage) -> Option<Generation> {
        let required = self.policy.is_gc_required(usage);
        if let Some(generation) = required {
            debug!(
                "[POLL] Triggering {:?} collection ({} of {} bytes used)",
                generation, usage.used_bytes, usage.total_bytes
            );
        }
        required
    }

    /// Called on every object allocation. Most policies do nothing here.
    #[inline(always)]
    pub fn on_allocation(&self) -> Option<Generation> {
        self.policy.on_allocation()
    }
}

/// A GC trigger policy. It is told about GC start and end so it can collect
/// statistics, and decides whether a background GC should run.
pub trait GCTriggerPolicy: Sync + Send {
    /// Inform the triggering policy that a GC starts.
    fn on_gc_start(&self, _usage: &HeapUsage) {}
    /// Inform the triggering policy that a GC ends. `usage` is measured after the GC.
    fn on_gc_end(&self, _generation: Generation, _usage: &HeapUsage) {}
    /// Is a background GC required now?
    fn is_gc_required(&self, usage: &HeapUsage) -> Option<Generation>;
    /// Is a GC required because of this allocation?
    fn on_allocation(&self) -> Option<Generation> {
        None
    }
    /// The occupancy at which the next background GC starts, if the policy has one.
    fn target_footprint(&self) -> Option<usize> {
        None
    }
}

/// Collect only when an allocation fails.
pub struct FixedHeapSizeTrigger;

impl GCTriggerPolicy for FixedHeapSizeTrigger {
    fn is_gc_required(&self, _usage: &HeapUsage) -> Option<Generation> {
        None
    }
}

/// Never start a background GC.
pub struct NeverTrigger;

impl GCTriggerPolicy for NeverTrigger {
    fn is_gc_required(&self, _usage: &HeapUsage) -> Option<Generation> {
        None
    }
}

/// The growth of the footprint after a full GC, in percent of the live size.
const HEAP_GROWTH_PERCENT: usize = 100;
const MIN_FREE: usize = 2 * BYTES_IN_MBYTE;

/// Clamp a target between `live + min_free` and `live + max_free`, and within the heap.
fn clamp_target(target: usize, live: usize, total: usize) -> usize {
    let min_free = MIN_FREE.min(total / 16);
    let max_free = total / 2;
    target
        .clamp(live.saturating_add(min_free), live.saturating_add(max_free))
        .min(total)
}

/// Request a full GC in the background once occupancy crosses a target footprint.
/// The target is recomputed from the live size after every full GC.
pub struct HeapThresholdTrigger {
    total_bytes: usize,
    target: AtomicUsize,
}

impl HeapThresholdTrigger {
    pub fn new(total_bytes: usize) -> Self {
        HeapThresholdTrigger {
            total_bytes,
            target: AtomicUsize::new(total_bytes / 4 * 3),
        }
    }
}

impl GCTriggerPolicy for HeapThresholdTrigger {
    fn on_gc_end(&self, generation: Generation, usage: &HeapUsage) {
        if generation == Generation::Full {
            let live = usage.used_bytes;
            let target = clamp_target(
                live + live * HEAP_GROWTH_PERCENT / 100,
                live,
                self.total_bytes,
            );
            trace!("Heap threshold: live {} -> target {}", live, target);
            self.target.store(target, Ordering::Relaxed);
        }
    }

    fn is_gc_required(&self, usage: &HeapUsage) -> Option<Generation> {
        if usage.used_bytes > self.target.load(Ordering::Relaxed) {
            Some(Generation::Full)
        } else {
            None
        }
    }

    fn target_footprint(&self) -> Option<usize> {
        Some(self.target.load(Ordering::Relaxed))
    }
}

/// How many past targets the adaptive trigger averages.
const ADAPTIVE_HISTORY: usize = 3;
/// Live size multiplier of the adaptive trigger.
const ADAPTIVE_MULTIPLIER: usize = 3;

/// Like `HeapThresholdTrigger`, but the target is the average of the recent targets,
/// which keeps a single outlier GC from moving it too far.
pub struct AdaptiveHeapTrigger {
    total_bytes: usize,
    history: Mutex<VecDeque<usize>>,
    target: AtomicUsize,
}

impl AdaptiveHeapTrigger {
    pub fn new(total_bytes: usize) -> Self {
        AdaptiveHeapTrigger {
            total_bytes,
            history: Mutex::new(VecDeque::with_capacity(ADAPTIVE_HISTORY)),
            target: AtomicUsize::new(total_bytes / 2),
        }
    }
}

impl GCTriggerPolicy for AdaptiveHeapTrigger {
    fn on_gc_end(&self, generation: Generation, usage: &HeapUsage) {
        if generation != Generation::Full {
            return;
        }
        let live = usage.used_bytes;
        let wanted = clamp_target(live * ADAPTIVE_MULTIPLIER, live, self.total_bytes);
        let mut history = self.history.lock().unwrap();
        if history.len() == ADAPTIVE_HISTORY {
            history.pop_front();
        }
        history.push_back(wanted);
        let average = history.iter().sum::<usize>() / history.len();
        // Never below what we need to hold the live data.
        let target = clamp_target(average, live, self.total_bytes);
        trace!("Adaptive trigger: live {} -> target {}", live, target);
        self.target.store(target, Ordering::Relaxed);
    }

    fn is_gc_required(&self, usage: &HeapUsage) -> Option<Generation> {
        if usage.used_bytes > self.target.load(Ordering::Relaxed) {
            Some(Generation::Full)
        } else {
            None
        }
    }

    fn target_footprint(&self) -> Option<usize> {
        Some(self.target.load(Ordering::Relaxed))
    }
}

/// Request a young GC on every N-th allocation.
pub struct NthAllocTrigger {
    n: usize,
    count: AtomicUsize,
}

impl NthAllocTrigger {
    pub fn new(n: usize) -> Self {
        debug_assert!(n > 0);
        NthAllocTrigger {
            n,
            count: AtomicUsize::new(0),
        }
    }
}

impl GCTriggerPolicy for NthAllocTrigger {
    fn is_gc_required(&self, _usage: &HeapUsage) -> Option<Generation> {
        None
    }

    fn on_allocation(&self) -> Option<Generation> {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % self.n == 0 {
            Some(Generation::Young)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = BYTES_IN_MBYTE;

    fn usage(used: usize) -> HeapUsage {
        HeapUsage {
            used_bytes: used,
            total_bytes: 64 * MB,
            young_bytes: 0,
        }
    }

    #[test]
    fn threshold_follows_live_size() {
        let t = HeapThresholdTrigger::new(64 * MB);
        assert_eq!(t.target_footprint(), Some(48 * MB));
        assert_eq!(t.is_gc_required(&usage(40 * MB)), None);
        assert_eq!(t.is_gc_required(&usage(49 * MB)), Some(Generation::Full));

        t.on_gc_end(Generation::Full, &usage(10 * MB));
        assert_eq!(t.target_footprint(), Some(20 * MB));
        // young GCs do not move the target
        t.on_gc_end(Generation::Young, &usage(MB));
        assert_eq!(t.target_footprint(), Some(20 * MB));

        // tiny live size: at least MIN_FREE of headroom
        t.on_gc_end(Generation::Full, &usage(0));
        assert_eq!(t.target_footprint(), Some(MIN_FREE));
        // huge live size: capped by the heap
        t.on_gc_end(Generation::Full, &usage(60 * MB));
        assert_eq!(t.target_footprint(), Some(64 * MB));
    }

    #[test]
    fn adaptive_averages_targets() {
        let t = AdaptiveHeapTrigger::new(64 * MB);
        t.on_gc_end(Generation::Full, &usage(4 * MB));
        assert_eq!(t.target_footprint(), Some(12 * MB));
        t.on_gc_end(Generation::Full, &usage(8 * MB));
        // average of 12M and 24M
        assert_eq!(t.target_footprint(), Some(18 * MB));
    }

    #[test]
    fn nth_alloc() {
        let t = NthAllocTrigger::new(3);
        let fired: Vec<bool> = (0..6).map(|_| t.on_allocation().is_some()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn selector() {
        let mut options = Options::default();
        options.gc_trigger = GCTriggerSelector::Never;
        let trigger = GCTrigger::new(&options);
        assert_eq!(trigger.poll(&usage(64 * MB)), None);
        assert_eq!(trigger.on_allocation(), None);
    }
}
