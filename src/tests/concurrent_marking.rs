use super::*;
use crate::plan::generational::marking;
use crate::util::sanity;
use crate::util::test_util::fixtures::{test_heap, Fixture, SingleMutator};
use crate::util::test_util::panic_after;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Start a marking by hand: activate the barrier and mark the roots, without
/// tracing from them.
fn start_marking(heap: &HeapContext) -> Vec<ObjectReference> {
    for id in heap.pool.heap_regions() {
        heap.pool.region(id).reset_live_bytes();
    }
    heap.satb.activate();
    marking::mark_roots(heap)
}

fn finish_marking(heap: &HeapContext, logged: bool) {
    let mut grey = marking::mark_roots(heap);
    let entries = heap.satb.take_all();
    if logged {
        for object in entries {
            if marking::mark(heap, object) {
                grey.push(object);
            }
        }
    }
    heap.satb.deactivate();
    marking::drain(heap, grey);
}

/// The mutator moves the only reference to a white object into a black object
/// and deletes the original edge. Without the pre-barrier the object is lost.
fn hide_object(f: &mut SingleMutator, logged: bool) -> (ObjectReference, ObjectReference) {
    let node = node_class(&f.heap);
    let black = new_node(&mut f.mutator, node, 1, AllocationSemantics::Tenured);
    let grey = new_node(&mut f.mutator, node, 2, AllocationSemantics::Tenured);
    let white = new_node(&mut f.mutator, node, 3, AllocationSemantics::Tenured);
    f.mutator.write_ref(grey, NEXT, Some(white));
    f.mutator.new_root(Some(black));
    f.mutator.new_root(Some(grey));
    f.mutator.enter_blocked();

    // The marker has scanned `black`, but not `grey`.
    let roots = start_marking(&f.heap);
    assert_eq!(roots.len(), 2);
    assert!(object::is_marked(black) && object::is_marked(grey));
    assert!(!object::is_marked(white));
    f.mutator.leave_blocked();

    let hidden = f.mutator.read_ref(grey, NEXT);
    f.mutator.write_ref(black, NEXT, hidden);
    f.mutator.write_ref(grey, NEXT, None);

    // Remark. Roots are re-marked, but `black` is not scanned again.
    f.mutator.enter_blocked();
    finish_marking(&f.heap, logged);
    (black, white)
}

#[test]
fn pre_barrier_keeps_hidden_object_alive() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let (_, white) = hide_object(f, true);
        assert!(object::is_marked(white));
        assert!(sanity::verify_tricolor(&f.heap).is_empty());
        marking::clear_marks(&f.heap);
        f.mutator.leave_blocked();
    });
}

#[test]
fn dropping_the_log_loses_the_object() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let (black, white) = hide_object(f, false);
        assert!(!object::is_marked(white));
        let problems = sanity::verify_tricolor(&f.heap);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains(&format!("{}", black)));
        marking::clear_marks(&f.heap);
        f.mutator.leave_blocked();
    });
}

/// The mutator loads a referent while marking runs and stores it into an object
/// that was already scanned. Only the referent load barrier keeps it alive.
fn resurrect_referent(
    f: &mut SingleMutator,
    barrier: bool,
) -> (ObjectReference, ObjectReference, ObjectReference) {
    let node = node_class(&f.heap);
    let weak = f
        .heap
        .register_class(ClassInfo::weak_reference("WeakRef", 32, &[], NEXT))
        .unwrap();
    let black = new_node(&mut f.mutator, node, 1, AllocationSemantics::Tenured);
    let referent = new_node(&mut f.mutator, node, 2, AllocationSemantics::Tenured);
    let reference =
        memory_manager::alloc_object(&mut f.mutator, weak, AllocationSemantics::Tenured).unwrap();
    f.mutator.write_ref(reference, NEXT, Some(referent));
    f.mutator.new_root(Some(black));
    f.mutator.new_root(Some(reference));
    f.mutator.enter_blocked();

    let roots = start_marking(&f.heap);
    marking::drain(&f.heap, roots);
    assert!(!object::is_marked(referent));
    f.mutator.leave_blocked();

    let loaded = if barrier {
        f.mutator.read_referent(reference)
    } else {
        f.mutator.read_ref(reference, NEXT)
    };
    assert_eq!(loaded, Some(referent));
    f.mutator.write_ref(black, NEXT, loaded);

    f.mutator.enter_blocked();
    finish_marking(&f.heap, true);
    marking::process_weak_refs(&f.heap);
    (black, reference, referent)
}

#[test]
fn loaded_referents_survive_marking() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let (_, reference, referent) = resurrect_referent(f, true);
        assert!(object::is_marked(referent));
        assert_eq!(object::load_ref(reference.to_raw_address() + NEXT), Some(referent));
        assert_eq!(f.heap.stats().references_cleared, 0);
        assert!(sanity::verify_tricolor(&f.heap).is_empty());
        marking::clear_marks(&f.heap);
        f.mutator.leave_blocked();
    });
}

#[test]
fn plain_referent_loads_lose_the_object() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let (black, reference, referent) = resurrect_referent(f, false);
        assert!(!object::is_marked(referent));
        assert_eq!(object::load_ref(reference.to_raw_address() + NEXT), None);
        assert_eq!(f.heap.stats().references_cleared, 1);
        let problems = sanity::verify_tricolor(&f.heap);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains(&format!("{}", black)));
        marking::clear_marks(&f.heap);
        f.mutator.leave_blocked();
    });
}

#[test]
fn objects_allocated_during_marking_are_black() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        f.mutator.enter_blocked();
        start_marking(&f.heap);
        f.mutator.leave_blocked();
        let o = new_node(&mut f.mutator, node, 7, AllocationSemantics::Tenured);
        assert!(object::is_marked(o));
        let region = f.heap.pool.region_of(o.to_raw_address()).unwrap();
        assert!(region.live_bytes() >= 32);
        f.mutator.enter_blocked();
        finish_marking(&f.heap, true);
        marking::clear_marks(&f.heap);
        f.mutator.leave_blocked();
    });
}

#[test]
fn concurrent_full_gcs_under_mutation() {
    const LEN: usize = 300;
    panic_after(60_000, || {
        let heap = test_heap("concurrent_marking=true run_gc_in_place=true");
        let node = node_class(&heap);
        let stop = Arc::new(AtomicBool::new(false));

        // A mutator that keeps relinking its list while marking runs.
        let churner = {
            let heap = heap.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut m = memory_manager::bind_mutator(&heap);
                let list = build_list(&mut m, node, 0, LEN);
                let spare = m.new_root(None);
                let mut swaps = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    // Unlink the second node and link it back, through a root.
                    let head = m.get_root(list).unwrap();
                    let second = m.read_ref(head, NEXT).unwrap();
                    let third = m.read_ref(second, NEXT);
                    m.set_root(spare, Some(second));
                    m.write_ref(head, NEXT, third);
                    new_node(&mut m, node, usize::MAX, AllocationSemantics::Default);
                    let head = m.get_root(list).unwrap();
                    let second = m.get_root(spare).unwrap();
                    m.write_ref(head, NEXT, Some(second));
                    m.set_root(spare, None);
                    swaps += 1;
                }
                check_list(&mut m, list, 0, LEN);
                swaps
            })
        };

        let mut m = memory_manager::bind_mutator(&heap);
        let keep = build_list(&mut m, node, 10_000, LEN);
        for _ in 0..10 {
            full_gc(&mut m);
            check_list(&mut m, keep, 10_000, LEN);
        }
        stop.store(true, Ordering::Relaxed);
        m.enter_blocked();
        let swaps = churner.join().unwrap();
        m.leave_blocked();
        assert!(swaps > 0);

        let stats = heap.stats();
        assert!(stats.full_gcs >= 10);
        assert_eq!(stats.concurrent_marks_aborted, 0);
        assert!(!heap.satb.is_active());
    });
}
