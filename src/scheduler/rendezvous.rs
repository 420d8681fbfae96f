//! Stopping the world.
//!
//! Mutators cooperate: they poll `suspend_requested` at safepoints and park
//! themselves. A thread that is blocked (waiting on I/O, on a lock, on a GC, or
//! running native code that does not touch the heap) is already safe and is not
//! waited for. It cannot leave the blocked state while the world is stopped.

use crate::plan::roots::RootTable;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Identifies a registered mutator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutatorId(pub u64);

impl fmt::Display for MutatorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mutator#{}", self.0)
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MutatorState {
    Running = 0,
    /// Parked at a safepoint because a GC asked for it.
    Suspended = 1,
    /// Voluntarily blocked. Counts as being at a safepoint.
    Blocked = 2,
}

impl MutatorState {
    fn from_u8(v: u8) -> MutatorState {
        match v {
            0 => MutatorState::Running,
            1 => MutatorState::Suspended,
            2 => MutatorState::Blocked,
            _ => unreachable!("corrupted mutator state {}", v),
        }
    }
}

/// The part of a mutator the collector can see from other threads.
pub struct MutatorShared {
    id: MutatorId,
    state: AtomicU8,
    /// Root handles owned by this mutator.
    pub(crate) roots: Mutex<RootTable>,
}

impl MutatorShared {
    pub fn id(&self) -> MutatorId {
        self.id
    }

    pub fn state(&self) -> MutatorState {
        MutatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MutatorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

struct RendezvousState {
    mutators: HashMap<MutatorId, Arc<MutatorShared>>,
    world_stopped: bool,
}

pub struct Rendezvous {
    /// Polled by mutators at every safepoint.
    suspend_requested: AtomicBool,
    /// Mirrors `RendezvousState::world_stopped` for lock-free checks.
    world_stopped: AtomicBool,
    next_id: AtomicU64,
    state: Mutex<RendezvousState>,
    cond: Condvar,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl Rendezvous {
    pub fn new() -> Self {
        Rendezvous {
            suspend_requested: AtomicBool::new(false),
            world_stopped: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            state: Mutex::new(RendezvousState {
                mutators: HashMap::new(),
                world_stopped: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<RendezvousState> {
        self.state.lock().unwrap()
    }

    fn wait_while_stopped<'a>(
        &self,
        mut guard: MutexGuard<'a, RendezvousState>,
    ) -> MutexGuard<'a, RendezvousState> {
        while guard.world_stopped || self.suspend_requested.load(Ordering::Acquire) {
            guard = self.cond.wait(guard).unwrap();
        }
        guard
    }

    /// Add a new mutator. It starts RUNNING, so this waits for a running GC to finish.
    pub fn register(&self) -> Arc<MutatorShared> {
        let shared = Arc::new(MutatorShared {
            id: MutatorId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            state: AtomicU8::new(MutatorState::Running as u8),
            roots: Mutex::new(RootTable::default()),
        });
        let mut guard = self.wait_while_stopped(self.lock());
        guard.mutators.insert(shared.id, shared.clone());
        debug!("Registered {}", shared.id);
        shared
    }

    /// Remove a mutator. Waits for a running GC to finish, since the GC may be using its roots.
    pub fn unregister(&self, mutator: &MutatorShared) {
        let mut guard = self.lock();
        while guard.world_stopped {
            guard = self.cond.wait(guard).unwrap();
        }
        guard.mutators.remove(&mutator.id);
        self.cond.notify_all();
        debug!("Unregistered {}", mutator.id);
    }

    pub fn mutators(&self) -> Vec<Arc<MutatorShared>> {
        let guard = self.lock();
        let mut all: Vec<_> = guard.mutators.values().cloned().collect();
        all.sort_by_key(|m| m.id);
        all
    }

    pub fn num_mutators(&self) -> usize {
        self.lock().mutators.len()
    }

    /// Is a GC asking mutators to stop? Mutators call `park` when this is true.
    #[inline(always)]
    pub fn is_suspend_requested(&self) -> bool {
        self.suspend_requested.load(Ordering::Acquire)
    }

    pub fn is_world_stopped(&self) -> bool {
        self.world_stopped.load(Ordering::Acquire)
    }

    /// Park `mutator` at a safepoint until the GC releases the world. The caller must
    /// already have published everything the GC needs (retired its TLAB, flushed barriers).
    pub fn park(&self, mutator: &MutatorShared) {
        let guard = self.lock();
        debug_assert_eq!(mutator.state(), MutatorState::Running);
        mutator.set_state(MutatorState::Suspended);
        self.cond.notify_all();
        trace!("{} parked", mutator.id);
        let _guard = self.wait_while_stopped(guard);
        mutator.set_state(MutatorState::Running);
        trace!("{} resumed", mutator.id);
    }

    /// The mutator will not touch the heap until `leave_blocked`.
    pub fn enter_blocked(&self, mutator: &MutatorShared) {
        let _guard = self.lock();
        debug_assert_eq!(mutator.state(), MutatorState::Running);
        mutator.set_state(MutatorState::Blocked);
        self.cond.notify_all();
    }

    /// Return to RUNNING, waiting for a GC that is stopping or has stopped the world.
    pub fn leave_blocked(&self, mutator: &MutatorShared) {
        let guard = self.lock();
        debug_assert_eq!(mutator.state(), MutatorState::Blocked);
        let _guard = self.wait_while_stopped(guard);
        mutator.set_state(MutatorState::Running);
    }

    /// Ask every mutator to stop and wait until none is running. Blocked mutators
    /// count as stopped. Only one GC may stop the world at a time.
    pub fn safepoint_begin(&self) {
        let mut guard = self.lock();
        debug_assert!(!guard.world_stopped, "The world is already stopped");
        self.suspend_requested.store(true, Ordering::Release);
        loop {
            let running = guard
                .mutators
                .values()
                .filter(|m| m.state() == MutatorState::Running)
                .count();
            if running == 0 {
                break;
            }
            trace!("Waiting for {} running mutator(s)", running);
            guard = self.cond.wait(guard).unwrap();
        }
        guard.world_stopped = true;
        self.world_stopped.store(true, Ordering::Release);
        debug!("World stopped ({} mutators)", guard.mutators.len());
    }

    /// Release the world.
    pub fn safepoint_end(&self) {
        let mut guard = self.lock();
        debug_assert!(guard.world_stopped, "The world is not stopped");
        guard.world_stopped = false;
        self.world_stopped.store(false, Ordering::Release);
        self.suspend_requested.store(false, Ordering::Release);
        self.cond.notify_all();
        debug!("World resumed");
    }

    /// Stop the world for the lifetime of the returned guard.
    pub fn stop_the_world(&self) -> WorldStopped {
        self.safepoint_begin();
        WorldStopped { rendezvous: self }
    }
}

/// Proof that the world is stopped. Dropping it resumes the mutators.
pub struct WorldStopped<'a> {
    rendezvous: &'a Rendezvous,
}

impl Drop for WorldStopped<'_> {
    fn drop(&mut self) {
        self.rendezvous.safepoint_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn blocked_mutators_do_not_hold_up_the_world() {
        let r = Rendezvous::new();
        let m = r.register();
        r.enter_blocked(&m);
        {
            let _stopped = r.stop_the_world();
            assert!(r.is_world_stopped());
        }
        assert!(!r.is_world_stopped());
        r.leave_blocked(&m);
        assert_eq!(m.state(), MutatorState::Running);
        r.unregister(&m);
        assert_eq!(r.num_mutators(), 0);
    }

    #[test]
    fn running_mutators_are_waited_for() {
        let r = Arc::new(Rendezvous::new());
        let in_pause = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let mutators: Vec<_> = (0..4)
            .map(|_| {
                let r = r.clone();
                let in_pause = in_pause.clone();
                let stop = stop.clone();
                let m = r.register();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        // "mutate"
                        if r.is_world_stopped() {
                            in_pause.fetch_add(1, Ordering::Relaxed);
                        }
                        if r.is_suspend_requested() {
                            r.park(&m);
                        }
                    }
                    r.unregister(&m);
                })
            })
            .collect();
        for _ in 0..50 {
            let stopped = r.stop_the_world();
            std::thread::sleep(Duration::from_micros(50));
            drop(stopped);
        }
        stop.store(true, Ordering::Relaxed);
        for m in mutators {
            m.join().unwrap();
        }
        assert_eq!(in_pause.load(Ordering::Relaxed), 0);
    }
}
