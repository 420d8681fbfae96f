use super::*;
use crate::util::test_util::fixtures::test_heap;
use crate::util::test_util::panic_after;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn nothing_allocates_while_the_world_is_stopped() {
    const THREADS: usize = 4;
    const ALLOCATIONS: usize = 20_000;
    const WINDOWS: usize = 50;
    panic_after(60_000, || {
        let heap = test_heap("");
        let node = node_class(&heap);
        let allocations = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        let mutators: Vec<_> = (0..THREADS)
            .map(|_| {
                let heap = heap.clone();
                let allocations = allocations.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    let mut m = memory_manager::bind_mutator(&heap);
                    for i in 0..ALLOCATIONS {
                        new_node(&mut m, node, i, AllocationSemantics::Default);
                        allocations.fetch_add(1, Ordering::SeqCst);
                    }
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let mut windows = 0;
        while windows < WINDOWS || done.load(Ordering::SeqCst) < THREADS {
            {
                let _cycle = heap.lock_cycle();
                let _world = heap.rendezvous.stop_the_world();
                let counted = allocations.load(Ordering::SeqCst);
                let allocated = heap.stats().bytes_allocated;
                std::thread::sleep(Duration::from_micros(200));
                assert_eq!(allocations.load(Ordering::SeqCst), counted);
                assert_eq!(heap.stats().bytes_allocated, allocated);
            }
            windows += 1;
            std::thread::yield_now();
        }
        for m in mutators {
            m.join().unwrap();
        }
        assert_eq!(allocations.load(Ordering::SeqCst), THREADS * ALLOCATIONS);
        assert_eq!(heap.stats().allocations_during_pause, 0);
    });
}

#[test]
fn leaving_blocked_waits_for_the_world() {
    panic_after(10_000, || {
        let heap = test_heap("");
        let left = Arc::new(AtomicUsize::new(0));
        let (ready_tx, ready_rx) = crossbeam::channel::bounded(0);
        let (go_tx, go_rx) = crossbeam::channel::bounded::<()>(0);
        let waiter = {
            let heap = heap.clone();
            let left = left.clone();
            std::thread::spawn(move || {
                let mut m = memory_manager::bind_mutator(&heap);
                m.enter_blocked();
                ready_tx.send(()).unwrap();
                go_rx.recv().unwrap();
                m.leave_blocked();
                left.store(1, Ordering::SeqCst);
            })
        };
        ready_rx.recv().unwrap();
        let world = heap.rendezvous.stop_the_world();
        go_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(left.load(Ordering::SeqCst), 0);
        drop(world);
        waiter.join().unwrap();
        assert_eq!(left.load(Ordering::SeqCst), 1);
        assert_eq!(heap.rendezvous.num_mutators(), 0);
    });
}
