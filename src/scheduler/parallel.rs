//! Parallel draining of GC work with work stealing.
//!
//! Each GC worker owns a deque and a context (its copy buffers, its mark counters).
//! Work produced while processing an item goes to the worker's own deque; idle
//! workers steal from the injector and then from each other.

use crossbeam::deque::{Injector, Steal, Stealer, Worker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Detects the point where every worker is out of work at the same time.
pub struct Terminator {
    const_nworkers: usize,
    nworkers: AtomicUsize,
}

impl Terminator {
    pub fn new(number_workers: usize) -> Terminator {
        Terminator {
            const_nworkers: number_workers,
            nworkers: AtomicUsize::new(number_workers),
        }
    }

    /// Called by a worker that found no work. Returns true once all workers are idle,
    /// false if some other worker is still busy (and may produce more work).
    pub fn try_terminate(&self) -> bool {
        if self.const_nworkers == 1 {
            return true;
        }

        if self.decrease_workers() {
            // reached 0, no need to wait
            return true;
        }

        thread::sleep(Duration::from_micros(1));
        self.zero_or_increase_workers()
    }

    fn decrease_workers(&self) -> bool {
        self.nworkers.fetch_sub(1, Ordering::AcqRel) == 1
    }

    fn zero_or_increase_workers(&self) -> bool {
        let mut nworkers = self.nworkers.load(Ordering::Acquire);
        loop {
            if nworkers == 0 {
                return true;
            }
            match self.nworkers.compare_exchange(
                nworkers,
                nworkers + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                // Somebody is still working. Go look for work again.
                Ok(_) => return false,
                Err(prev) => nworkers = prev,
            }
        }
    }
}

/// The view of the work queues a worker gets while processing an item.
pub struct WorkQueue<'a, T> {
    id: usize,
    local: Worker<T>,
    injector: &'a Injector<T>,
    stealers: &'a [Stealer<T>],
}

impl<T> WorkQueue<'_, T> {
    /// Queue more work.
    pub fn push(&self, item: T) {
        self.local.push(item);
    }

    fn pop(&self) -> Option<T> {
        self.local
            .pop()
            .or_else(|| self.pop_global())
            .or_else(|| self.steal())
    }

    fn pop_global(&self) -> Option<T> {
        loop {
            match self.injector.steal_batch_and_pop(&self.local) {
                Steal::Empty => return None,
                Steal::Success(item) => return Some(item),
                Steal::Retry => continue,
            }
        }
    }

    fn steal(&self) -> Option<T> {
        let n = self.stealers.len();
        for i in 1..n {
            let stealer = &self.stealers[(self.id + i) % n];
            loop {
                match stealer.steal_batch_and_pop(&self.local) {
                    Steal::Empty => break,
                    Steal::Success(item) => return Some(item),
                    Steal::Retry => continue,
                }
            }
        }
        None
    }
}

fn run_worker<T, C, F>(queue: WorkQueue<T>, context: &mut C, terminator: &Terminator, work: &F)
where
    F: Fn(&mut C, T, &WorkQueue<T>),
{
    loop {
        if let Some(item) = queue.pop() {
            work(context, item, &queue);
        } else if terminator.try_terminate() {
            break;
        }
    }
}

/// Process `initial` and all work it transitively produces, with one worker per context.
/// With a single context everything runs on the calling thread.
pub fn drain<T, C, F>(contexts: &mut [C], initial: Vec<T>, work: F)
where
    T: Send,
    C: Send,
    F: Fn(&mut C, T, &WorkQueue<T>) + Sync,
{
    let nworkers = contexts.len();
    assert!(nworkers > 0);
    let injector = Injector::new();
    for item in initial {
        injector.push(item);
    }
    let workers: Vec<Worker<T>> = (0..nworkers).map(|_| Worker::new_lifo()).collect();
    let stealers: Vec<Stealer<T>> = workers.iter().map(|w| w.stealer()).collect();
    let terminator = Terminator::new(nworkers);

    if nworkers == 1 {
        let queue = WorkQueue {
            id: 0,
            local: workers.into_iter().next().unwrap_or_else(Worker::new_lifo),
            injector: &injector,
            stealers: &stealers,
        };
        run_worker(queue, &mut contexts[0], &terminator, &work);
        return;
    }

    thread::scope(|s| {
        for (id, (local, context)) in workers.into_iter().zip(contexts.iter_mut()).enumerate() {
            let queue = WorkQueue {
                id,
                local,
                injector: &injector,
                stealers: &stealers,
            };
            let terminator = &terminator;
            let work = &work;
            thread::Builder::new()
                .name(format!("gengc-worker-{}", id))
                .spawn_scoped(s, move || run_worker(queue, context, terminator, work))
                .unwrap_or_else(|e| panic!("Failed to spawn a GC worker: {}", e));
        }
    });
}

/// Run `f` once per context, in parallel. Used for phases that split a known list
/// of items (e.g. regions) up front.
pub fn for_each_parallel<T, C, F>(contexts: &mut [C], items: Vec<T>, f: F)
where
    T: Send,
    C: Send,
    F: Fn(&mut C, T) + Sync,
{
    drain(contexts, items, |c, item, _| f(c, item));
}
