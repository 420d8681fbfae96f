//! The queue of collection requests.
//!
//! Requests get a ticket. Tasks run in ticket order, so a requester that wants to
//! wait for its collection waits until every ticket up to its own is finished.

use super::gc_task::{GcCause, GcTask, Generation};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct RequesterState {
    queue: VecDeque<GcTask>,
    running: Option<GcTask>,
    next_ticket: u64,
    /// Every ticket up to this one is done (ran or was skipped).
    finished_through: u64,
    /// Completed cycles of any kind.
    cycles: u64,
    /// Completed full cycles.
    full_cycles: u64,
    shutdown: bool,
    postponed: bool,
}

/// Misuse of `postpone_start` and `postpone_end`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PostponeError {
    AlreadyPostponed,
    NotPostponed,
}

impl fmt::Display for PostponeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PostponeError::AlreadyPostponed => write!(f, "collections are already postponed"),
            PostponeError::NotPostponed => write!(f, "collections are not postponed"),
        }
    }
}

impl std::error::Error for PostponeError {}

/// What the GC runner should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum NextTask {
    Run(GcTask),
    /// Nothing was requested within the timeout.
    Timeout,
    Shutdown,
}

/// This data structure lets mutators trigger GC, and lets the GC runner pick up work.
pub struct GCRequester {
    state: Mutex<RequesterState>,
    /// Notified when a task is queued, and on shutdown.
    work_available: Condvar,
    /// Notified when tasks finish.
    task_finished: Condvar,
    /// The queue length, readable without the lock.
    pending: AtomicUsize,
}

impl Default for GCRequester {
    fn default() -> Self {
        Self::new()
    }
}

impl GCRequester {
    pub fn new() -> Self {
        GCRequester {
            state: Mutex::new(RequesterState {
                queue: VecDeque::new(),
                running: None,
                next_ticket: 1,
                finished_through: 0,
                cycles: 0,
                full_cycles: 0,
                shutdown: false,
                postponed: false,
            }),
            work_available: Condvar::new(),
            task_finished: Condvar::new(),
            pending: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<RequesterState> {
        self.state.lock().unwrap()
    }

    /// Queue a collection and return the ticket to wait for. Duplicate requests are
    /// merged into a task that is already queued (or, for background causes, running).
    pub fn request(&self, cause: GcCause, generation: Generation) -> u64 {
        let mut state = self.lock();
        if state.postponed && cause.is_background() {
            debug!("Dropped {} {} request: collections are postponed", cause, generation);
            return state.finished_through;
        }
        let cycles = state.cycles;
        let full_cycles = state.full_cycles;

        if cause.is_background() {
            if let Some(running) = state.running.filter(|t| t.cause == cause) {
                trace!("Coalesced {} request with running {:?}", cause, running);
                return running.ticket;
            }
        }
        let existing = state
            .queue
            .iter()
            .position(|t| t.cause == cause)
            .or_else(|| {
                if cause.is_mandatory() {
                    None
                } else {
                    state
                        .queue
                        .iter()
                        .position(|t| t.generation >= generation)
                }
            });
        if let Some(i) = existing {
            let task = &mut state.queue[i];
            task.generation = task.generation.max(generation);
            // The joined task must not be skipped because of a cycle that completed
            // before this request.
            task.cycles_at_request = cycles;
            task.full_cycles_at_request = full_cycles;
            trace!("Merged {} {} request into {:?}", cause, generation, task);
            return task.ticket;
        }

        let task = GcTask {
            cause,
            generation,
            ticket: state.next_ticket,
            cycles_at_request: cycles,
            full_cycles_at_request: full_cycles,
        };
        state.next_ticket += 1;
        state.queue.push_back(task);
        self.pending.store(state.queue.len(), Ordering::Release);
        debug!("Queued {:?}", task);
        self.work_available.notify_all();
        task.ticket
    }

    fn should_skip(state: &RequesterState, task: &GcTask) -> bool {
        if task.cause.is_mandatory() {
            return false;
        }
        match task.generation {
            Generation::Young => state.cycles > task.cycles_at_request,
            Generation::Full => state.full_cycles > task.full_cycles_at_request,
        }
    }

    fn pop_runnable(&self, state: &mut RequesterState) -> Option<GcTask> {
        debug_assert!(state.running.is_none());
        while let Some(task) = state.queue.pop_front() {
            self.pending.store(state.queue.len(), Ordering::Release);
            if Self::should_skip(state, &task) {
                debug!("Skipped {:?}: already collected since it was requested", task);
                state.finished_through = task.ticket;
                self.task_finished.notify_all();
                continue;
            }
            if state.postponed && task.cause.is_background() {
                debug!("Skipped {:?}: collections are postponed", task);
                state.finished_through = task.ticket;
                self.task_finished.notify_all();
                continue;
            }
            state.running = Some(task);
            return Some(task);
        }
        None
    }

    /// Block until there is a task to run, the timeout expires, or we shut down.
    pub fn next_task(&self, timeout: Option<Duration>) -> NextTask {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return NextTask::Shutdown;
            }
            if let Some(task) = self.pop_runnable(&mut state) {
                return NextTask::Run(task);
            }
            match timeout {
                Some(timeout) => {
                    let (s, result) = self.work_available.wait_timeout(state, timeout).unwrap();
                    state = s;
                    if result.timed_out() && state.queue.is_empty() && !state.shutdown {
                        return NextTask::Timeout;
                    }
                }
                None => state = self.work_available.wait(state).unwrap(),
            }
        }
    }

    /// Take the next task without blocking. Used by threads that run GC in place.
    pub fn try_next_task(&self) -> Option<GcTask> {
        let mut state = self.lock();
        if state.shutdown {
            return None;
        }
        self.pop_runnable(&mut state)
    }

    /// Record that `task` is done. `collected` is what the cycle actually collected,
    /// which may be more than was requested, or `None` if the cycle was abandoned.
    pub fn finish(&self, task: GcTask, collected: Option<Generation>) {
        let mut state = self.lock();
        debug_assert_eq!(state.running, Some(task));
        state.running = None;
        if let Some(collected) = collected {
            state.cycles += 1;
            if collected == Generation::Full {
                state.full_cycles += 1;
            }
        }
        state.finished_through = task.ticket;
        self.task_finished.notify_all();
    }

    /// Block until the task with `ticket` is done. No timeout: GC completion is not optional.
    pub fn wait_for(&self, ticket: u64) {
        let mut state = self.lock();
        while state.finished_through < ticket && !state.shutdown {
            state = self.task_finished.wait(state).unwrap();
        }
    }

    pub fn is_finished(&self, ticket: u64) -> bool {
        self.lock().finished_through >= ticket
    }

    /// Are there queued tasks? Lock-free, may be stale.
    #[inline(always)]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Is a task queued that must not wait behind a background cycle?
    pub fn has_pending_mandatory(&self) -> bool {
        self.has_pending() && self.lock().queue.iter().any(|t| t.cause.is_mandatory())
    }

    /// The newest ticket handed out so far.
    pub fn last_ticket(&self) -> u64 {
        self.lock().next_ticket - 1
    }

    pub fn pending_tasks(&self) -> Vec<GcTask> {
        self.lock().queue.iter().copied().collect()
    }

    /// Completed cycles: (all, full).
    pub fn completed_cycles(&self) -> (u64, u64) {
        let state = self.lock();
        (state.cycles, state.full_cycles)
    }

    /// Stop background collections until `postpone_end`. Background tasks already
    /// queued are dropped when they come up.
    pub fn postpone_start(&self) -> Result<(), PostponeError> {
        let mut state = self.lock();
        if state.postponed {
            return Err(PostponeError::AlreadyPostponed);
        }
        state.postponed = true;
        debug!("Collections postponed");
        Ok(())
    }

    pub fn postpone_end(&self) -> Result<(), PostponeError> {
        let mut state = self.lock();
        if !state.postponed {
            return Err(PostponeError::NotPostponed);
        }
        state.postponed = false;
        debug!("Collections no longer postponed");
        Ok(())
    }

    pub fn is_postponed(&self) -> bool {
        self.lock().postponed
    }

    /// Wake everybody up. Queued tasks will not run; waiters return.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        state.queue.clear();
        self.pending.store(0, Ordering::Release);
        self.work_available.notify_all();
        self.task_finished.notify_all();
    }
}
