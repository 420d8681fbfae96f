use super::*;
use crate::util::heap::SpaceType;
use crate::util::test_util::fixtures::{Fixture, SingleMutator};
use crate::util::test_util::panic_after;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn unreachable_young_objects_are_all_reclaimed() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let baseline = f.heap.used_bytes();
        for i in 0..2000 {
            new_node(&mut f.mutator, node, i, AllocationSemantics::Default);
        }
        assert!(f.heap.used_bytes() > baseline);

        young_gc(&mut f.mutator);
        let stats = f.heap.stats();
        assert_eq!(stats.young_gcs, 1);
        assert_eq!(stats.objects_copied, 0);
        assert_eq!(f.heap.used_bytes(), baseline);
        assert_eq!(count_objects(&mut f.mutator, node), 0);
    });
}

#[test]
fn even_survivors_age_and_get_promoted() {
    const N: usize = 200;
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let array_class = ref_array_class(&f.heap);
        let tenuring_threshold = f.heap.options().tenuring_threshold as usize;
        let array = memory_manager::alloc_array(
            &mut f.mutator,
            array_class,
            N / 2,
            AllocationSemantics::Default,
        )
        .unwrap();
        let root = f.mutator.new_root(Some(array));
        for i in 0..N {
            let o = new_node(&mut f.mutator, node, i, AllocationSemantics::Default);
            if i % 2 == 0 {
                let array = f.mutator.get_root(root).unwrap();
                f.mutator.write_ref(array, object::array_element_offset(i / 2), Some(o));
            }
        }

        for cycle in 1..=tenuring_threshold {
            young_gc(&mut f.mutator);
            assert_eq!(count_objects(&mut f.mutator, node), N / 2, "after young GC {}", cycle);
            let array = f.mutator.get_root(root).unwrap();
            for j in 0..N / 2 {
                let o = f.mutator.read_ref(array, object::array_element_offset(j)).unwrap();
                assert_eq!(payload(o), 2 * j);
                let expected = if cycle < tenuring_threshold {
                    SpaceType::Young
                } else {
                    SpaceType::Tenured
                };
                assert_eq!(f.heap.space_of(o), expected, "after young GC {}", cycle);
                assert_eq!(object::age(o) as usize, cycle);
            }
        }
        let stats = f.heap.stats();
        assert_eq!(stats.young_gcs, tenuring_threshold);
        // The nodes and the array.
        assert_eq!(stats.objects_promoted, N / 2 + 1);
    });
}

#[test]
fn card_table_keeps_young_object_referenced_from_tenured() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let old = new_node(&mut f.mutator, node, 1, AllocationSemantics::Tenured);
        let root = f.mutator.new_root(Some(old));
        let young = new_node(&mut f.mutator, node, 2, AllocationSemantics::Default);
        assert_eq!(f.heap.space_of(young), SpaceType::Young);
        f.mutator.write_ref(old, NEXT, Some(young));
        assert!(f.heap.card_table.is_card_dirty(old.to_raw_address()));

        young_gc(&mut f.mutator);
        // Tenured objects do not move in a young GC.
        assert_eq!(f.mutator.get_root(root), Some(old));
        let moved = f.mutator.read_ref(old, NEXT).unwrap();
        assert_ne!(moved, young);
        assert_eq!(payload(moved), 2);
        assert_eq!(f.heap.space_of(moved), SpaceType::Young);
        // The edge still crosses generations, so the card stays dirty.
        assert!(f.heap.card_table.is_card_dirty(old.to_raw_address()));

        full_gc(&mut f.mutator);
        let old = f.mutator.get_root(root).unwrap();
        let child = f.mutator.read_ref(old, NEXT).unwrap();
        assert_eq!(payload(child), 2);
        assert_eq!(f.heap.space_of(child), SpaceType::Tenured);
        assert_eq!(f.heap.card_table.count_dirty(), 0);
    });
}

#[test]
fn every_object_on_a_dirty_card_is_scanned() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let first = new_node(&mut f.mutator, node, 1, AllocationSemantics::Tenured);
        let second = new_node(&mut f.mutator, node, 2, AllocationSemantics::Tenured);
        assert_eq!(
            f.heap.card_table.card_start(first.to_raw_address()),
            f.heap.card_table.card_start(second.to_raw_address())
        );
        let roots = [f.mutator.new_root(Some(first)), f.mutator.new_root(Some(second))];
        let young = new_node(&mut f.mutator, node, 3, AllocationSemantics::Default);
        // Only the second object on the card refers to young space.
        f.mutator.write_ref(second, NEXT, Some(young));

        young_gc(&mut f.mutator);
        let moved = f.mutator.read_ref(second, NEXT).unwrap();
        assert_ne!(moved, young);
        assert_eq!(f.heap.space_of(moved), SpaceType::Young);
        assert_eq!(payload(moved), 3);
        assert_eq!(f.heap.stats().objects_copied, 1);
        assert!(f.heap.card_table.is_card_dirty(second.to_raw_address()));
        assert_eq!(f.mutator.read_ref(first, NEXT), None);

        // Still found on the next cycle.
        young_gc(&mut f.mutator);
        let moved = f.mutator.read_ref(second, NEXT).unwrap();
        assert_eq!(payload(moved), 3);
        for root in roots {
            assert!(f.mutator.get_root(root).is_some());
        }
    });
}

#[test]
fn unused_promotion_buffers_return_to_the_free_list() {
    let mut f = SingleMutator::with_options("tenuring_threshold=1");
    let node = node_class(&f.heap);
    // Give tenured space a region to carve promotion buffers from.
    let anchor = new_node(&mut f.mutator, node, 0, AllocationSemantics::Tenured);
    let _anchor = f.mutator.new_root(Some(anchor));
    let list = build_list(&mut f.mutator, node, 0, 100);
    let free_before = f.heap.tenured.free_bytes();

    young_gc(&mut f.mutator);
    let stats = f.heap.stats();
    assert_eq!(stats.objects_promoted, 100);
    assert_eq!(f.heap.tenured.free_bytes() + stats.bytes_promoted, free_before);
    check_list(&mut f.mutator, list, 0, 100);
}

#[test]
fn explicit_full_gc_with_concurrent_allocators() {
    const THREADS: usize = 4;
    const LISTS: usize = 20;
    const LEN: usize = 200;
    panic_after(60_000, || {
        let fixture = Fixture::<SingleMutator>::new();
        fixture.with_fixture_mut(|f| {
            let node = node_class(&f.heap);
            let stop = Arc::new(AtomicBool::new(false));
            let workers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let heap = f.heap.clone();
                    let stop = stop.clone();
                    std::thread::spawn(move || {
                        let mut mutator = memory_manager::bind_mutator(&heap);
                        let keep = build_list(&mut mutator, node, t * 1_000_000, LEN);
                        let mut rounds = 0;
                        while rounds < LISTS || !stop.load(Ordering::Relaxed) {
                            let base = t * 1_000_000 + (rounds + 1) * 1000;
                            let list = build_list(&mut mutator, node, base, LEN);
                            check_list(&mut mutator, list, base, LEN);
                            mutator.remove_root(list);
                            check_list(&mut mutator, keep, t * 1_000_000, LEN);
                            rounds += 1;
                        }
                        check_list(&mut mutator, keep, t * 1_000_000, LEN);
                        rounds
                    })
                })
                .collect();

            let before = f.heap.stats().full_gcs;
            full_gc(&mut f.mutator);
            // The request returns only after the cycle completed.
            assert!(f.heap.stats().full_gcs > before);

            stop.store(true, Ordering::Relaxed);
            f.mutator.enter_blocked();
            let rounds: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
            f.mutator.leave_blocked();
            assert!(rounds.iter().all(|&r| r >= LISTS));

            // Every object shows up exactly once in a heap walk.
            let mut seen = HashSet::new();
            f.mutator.for_each_object(true, &mut |o| assert!(seen.insert(o), "{} seen twice", o));
            assert_eq!(f.heap.stats().allocations_during_pause, 0);
        });
    });
}

#[test]
fn humongous_threshold_boundary() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let bytes = f
            .heap
            .register_class(crate::vm::ClassInfo::primitive_array("byte[]", 1))
            .unwrap();
        let threshold = f.heap.humongous_threshold;
        let header = crate::util::constants::ARRAY_HEADER_BYTES;

        let below = memory_manager::alloc_array(
            &mut f.mutator,
            bytes,
            threshold - 1 - header,
            AllocationSemantics::Default,
        )
        .unwrap();
        let below_root = f.mutator.new_root(Some(below));
        let at = memory_manager::alloc_array(
            &mut f.mutator,
            bytes,
            threshold - header,
            AllocationSemantics::Default,
        )
        .unwrap();
        let at_root = f.mutator.new_root(Some(at));
        assert_ne!(f.heap.space_of(below), SpaceType::Humongous);
        assert_eq!(f.heap.space_of(at), SpaceType::Humongous);

        young_gc(&mut f.mutator);
        full_gc(&mut f.mutator);
        young_gc(&mut f.mutator);

        assert_eq!(f.mutator.get_root(at_root), Some(at));
        assert_eq!(f.heap.space_of(at), SpaceType::Humongous);
        assert_eq!(object::array_length(at), threshold - header);
        let below = f.mutator.get_root(below_root).unwrap();
        assert_eq!(f.heap.space_of(below), SpaceType::Tenured);
        assert_eq!(object::array_length(below), threshold - 1 - header);
    });
}
