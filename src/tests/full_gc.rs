use super::*;
use crate::util::alloc::AllocationError;
use crate::util::heap::SpaceType;
use crate::util::test_util::fixtures::{Fixture, SingleMutator};

/// A tenured list of `len` nodes, with `garbage` dead tenured nodes allocated
/// after each live one. Returns the root and the node addresses, head first.
fn tenured_list(
    f: &mut SingleMutator,
    node: ClassId,
    len: usize,
    garbage: usize,
) -> (RootHandle, Vec<ObjectReference>) {
    let root = f.mutator.new_root(None);
    let mut nodes = vec![];
    for i in 0..len {
        let n = new_node(&mut f.mutator, node, i, AllocationSemantics::Tenured);
        let prev = f.mutator.get_root(root);
        f.mutator.write_ref(n, NEXT, prev);
        f.mutator.set_root(root, Some(n));
        nodes.push(n);
        for _ in 0..garbage {
            new_node(&mut f.mutator, node, usize::MAX, AllocationSemantics::Tenured);
        }
    }
    nodes.reverse();
    (root, nodes)
}

fn list_addresses(f: &mut SingleMutator, root: RootHandle) -> Vec<ObjectReference> {
    let mut nodes = vec![];
    let mut cursor = f.mutator.get_root(root);
    while let Some(n) = cursor {
        nodes.push(n);
        cursor = f.mutator.read_ref(n, NEXT);
    }
    nodes
}

#[test]
fn dead_tenured_and_humongous_objects_are_reclaimed() {
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let bytes = f.heap.register_class(ClassInfo::primitive_array("byte[]", 1)).unwrap();
        let huge_len = f.heap.humongous_threshold;

        let kept = new_node(&mut f.mutator, node, 1, AllocationSemantics::Tenured);
        let kept_root = f.mutator.new_root(Some(kept));
        for i in 0..500 {
            new_node(&mut f.mutator, node, i, AllocationSemantics::Tenured);
        }
        let huge = memory_manager::alloc_array(
            &mut f.mutator,
            bytes,
            huge_len,
            AllocationSemantics::Default,
        )
        .unwrap();
        let huge_root = f.mutator.new_root(Some(huge));
        for _ in 0..3 {
            memory_manager::alloc_array(
                &mut f.mutator,
                bytes,
                huge_len,
                AllocationSemantics::Default,
            )
            .unwrap();
        }
        // Each array needs one region of its own.
        assert_eq!(f.heap.stats().regions[SpaceType::Humongous], 4);
        assert_eq!(count_objects(&mut f.mutator, node), 501);

        full_gc(&mut f.mutator);
        let after = f.heap.stats();
        assert_eq!(after.full_gcs, 1);
        assert_eq!(after.regions[SpaceType::Humongous], 1);
        assert!(after.regions_released >= 3);
        assert_eq!(count_objects(&mut f.mutator, node), 1);
        assert_eq!(f.mutator.get_root(kept_root).map(payload), Some(1));
        // Humongous objects never move.
        assert_eq!(f.mutator.get_root(huge_root), Some(huge));
        assert_eq!(memory_manager::array_length(huge), huge_len);

        f.mutator.remove_root(huge_root);
        f.mutator.remove_root(kept_root);
        full_gc(&mut f.mutator);
        let last = f.heap.stats();
        assert_eq!(last.regions[SpaceType::Humongous], 0);
        assert_eq!(last.regions[SpaceType::Tenured], 0);
        assert_eq!(count_objects(&mut f.mutator, node), 0);
    });
}

#[test]
fn sparse_regions_are_compacted() {
    const LEN: usize = 1000;
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        // One live node in ten, well below the compaction threshold.
        let (root, before) = tenured_list(f, node, LEN, 9);
        let free_before = f.heap.tenured.free_bytes();

        full_gc(&mut f.mutator);
        let after = list_addresses(f, root);
        assert_eq!(after.len(), LEN);
        for (i, n) in after.iter().enumerate() {
            assert_eq!(payload(*n), LEN - 1 - i);
            assert_eq!(f.heap.space_of(*n), SpaceType::Tenured);
        }
        let moved = before.iter().zip(&after).filter(|(b, a)| b != a).count();
        assert!(moved > LEN / 2, "only {} of {} nodes moved", moved, LEN);
        assert!(f.heap.tenured.free_bytes() > free_before);
        assert_eq!(count_objects(&mut f.mutator, node), LEN);

        // The freed space is reused without another collection.
        let gcs = f.heap.stats().gc_count();
        for i in 0..LEN {
            new_node(&mut f.mutator, node, i, AllocationSemantics::Tenured);
        }
        assert_eq!(f.heap.stats().gc_count(), gcs);
    });
}

#[test]
fn dense_regions_are_swept_in_place() {
    const LEN: usize = 1500;
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let (root, before) = tenured_list(f, node, LEN, 0);
        // A quarter of the region is garbage, above the compaction threshold.
        for i in 0..LEN / 4 {
            new_node(&mut f.mutator, node, i, AllocationSemantics::Tenured);
        }
        full_gc(&mut f.mutator);
        assert_eq!(list_addresses(f, root), before);
        assert_eq!(count_objects(&mut f.mutator, node), LEN);
    });
}

#[test]
fn prepare_for_fork_compacts_everything() {
    const LEN: usize = 1000;
    let fixture = Fixture::<SingleMutator>::new();
    fixture.with_fixture_mut(|f| {
        let node = node_class(&f.heap);
        let (root, before) = tenured_list(f, node, LEN, 1);
        let young = build_list(&mut f.mutator, node, 5000, 100);

        memory_manager::prepare_for_fork(&mut f.mutator);
        let stats = f.heap.stats();
        assert_eq!(stats.full_gcs, 1);
        assert_eq!(stats.regions[SpaceType::Young], 0);

        let after = list_addresses(f, root);
        assert_eq!(after.len(), LEN);
        assert_ne!(after, before);
        for (i, n) in after.iter().enumerate() {
            assert_eq!(payload(*n), LEN - 1 - i);
        }
        check_list(&mut f.mutator, young, 5000, 100);
        assert_eq!(count_objects(&mut f.mutator, node), LEN + 100);
        assert_eq!(f.heap.card_table.count_dirty(), 0);
    });
}

#[test]
fn heap_without_collector_runs_out_of_memory() {
    let mut f = SingleMutator::with_options("plan=NoGC heap_size=4M");
    let big = f.heap.register_class(ClassInfo::instance("Big", 8192, &[])).unwrap();
    assert_eq!(f.heap.collector().name(), "NoGC");

    let mut allocated = 0;
    let error = loop {
        match memory_manager::alloc_object(&mut f.mutator, big, AllocationSemantics::Default) {
            Ok(_) => allocated += 1,
            Err(e) => break e,
        }
        assert!(allocated < 1000, "a 4M heap cannot hold {} 8K objects", allocated);
    };
    assert_eq!(error, AllocationError::HeapOutOfMemory);
    assert!(allocated > 0);
    assert_eq!(f.heap.stats().gc_count(), 0);
    assert_eq!(f.heap.free_bytes(), 0);
}
