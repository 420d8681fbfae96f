//! Collector scenarios that need a whole heap. Each test builds its own small
//! heap through `util::test_util::fixtures`, with heap verification on.

mod concurrent_marking;
mod end_to_end;
mod full_gc;
mod safepoint;

use crate::heap::HeapContext;
use crate::memory_manager;
use crate::object;
use crate::plan::{AllocationSemantics, GcCause, Generation, Mutator, RootHandle};
use crate::util::ObjectReference;
use crate::vm::{ClassId, ClassInfo};

/// Byte offset of `Node::next`.
pub(crate) const NEXT: usize = 16;
/// Byte offset of `Node::payload`, a plain word.
pub(crate) const PAYLOAD: usize = 24;

/// A 32-byte object with one reference field and one word of payload.
pub(crate) fn node_class(heap: &HeapContext) -> ClassId {
    heap.register_class(ClassInfo::instance("Node", 32, &[NEXT]))
        .unwrap()
}

pub(crate) fn ref_array_class(heap: &HeapContext) -> ClassId {
    heap.register_class(ClassInfo::ref_array("Object[]")).unwrap()
}

pub(crate) fn new_node(
    mutator: &mut Mutator,
    class: ClassId,
    payload: usize,
    semantics: AllocationSemantics,
) -> ObjectReference {
    let node = memory_manager::alloc_object(mutator, class, semantics).unwrap();
    memory_manager::write_word(node, PAYLOAD, payload);
    node
}

pub(crate) fn payload(node: ObjectReference) -> usize {
    memory_manager::read_word(node, PAYLOAD)
}

/// Objects of `class` anywhere in the heap, dead or alive.
pub(crate) fn count_objects(mutator: &mut Mutator, class: ClassId) -> usize {
    let mut count = 0;
    mutator.for_each_object(false, &mut |o| {
        if object::class_id(o) == class {
            count += 1;
        }
    });
    count
}

pub(crate) fn young_gc(mutator: &mut Mutator) {
    mutator.request_gc(GcCause::Explicit, Generation::Young, true);
}

pub(crate) fn full_gc(mutator: &mut Mutator) {
    mutator.request_gc(GcCause::Explicit, Generation::Full, true);
}

/// Build a list of `len` nodes with payloads `base..base + len`, head last.
/// Returns a root holding the head.
pub(crate) fn build_list(
    mutator: &mut Mutator,
    class: ClassId,
    base: usize,
    len: usize,
) -> RootHandle {
    let handle = mutator.new_root(None);
    for i in 0..len {
        let node = new_node(mutator, class, base + i, AllocationSemantics::Default);
        // The previous head may have moved during the allocation.
        let prev = mutator.get_root(handle);
        mutator.write_ref(node, NEXT, prev);
        mutator.set_root(handle, Some(node));
    }
    handle
}

/// Walk a list built by `build_list` and check its payloads.
pub(crate) fn check_list(mutator: &mut Mutator, list: RootHandle, base: usize, len: usize) {
    let mut cursor = mutator.get_root(list);
    let mut expected = base + len;
    while let Some(node) = cursor {
        assert!(expected > base, "list is too long");
        expected -= 1;
        assert_eq!(payload(node), expected, "corrupted list node {}", node);
        cursor = mutator.read_ref(node, NEXT);
    }
    assert_eq!(expected, base, "list is too short");
}
