//! Raw access to object memory.
//!
//! This is the only module that dereferences heap addresses. Everything else works
//! with `ObjectReference`, `Address` and the functions here. Callers must pass
//! references to objects that are inside a heap region that is not free; the
//! functions are safe to call under that contract, which the allocators and the
//! collector maintain.

pub mod header;

use crate::util::constants::*;
use crate::util::{Address, ObjectReference};
use crate::vm::{ClassId, ClassRegistry, ObjectKind};
use header::{HeaderState, StatusWord};
use std::sync::atomic::{AtomicUsize, Ordering};

const STATUS_OFFSET: usize = 0;
const HASH_OFFSET: usize = BYTES_IN_WORD;
const LENGTH_OFFSET: usize = 2 * BYTES_IN_WORD;

fn word_at<'a>(addr: Address) -> &'a AtomicUsize {
    unsafe { addr.as_atomic::<AtomicUsize>() }
}

fn status_cell<'a>(object: ObjectReference) -> &'a AtomicUsize {
    word_at(object.to_raw_address() + STATUS_OFFSET)
}

pub(crate) fn load_status_raw(object: ObjectReference) -> usize {
    status_cell(object).load(Ordering::Acquire)
}

pub(crate) fn store_status_raw(object: ObjectReference, raw: usize) {
    status_cell(object).store(raw, Ordering::Release)
}

pub(crate) fn compare_exchange_status(
    object: ObjectReference,
    old: usize,
    new: usize,
) -> Result<usize, usize> {
    status_cell(object).compare_exchange(old, new, Ordering::AcqRel, Ordering::Acquire)
}

pub fn header_state(object: ObjectReference) -> HeaderState {
    HeaderState::decode(load_status_raw(object))
}

/// The status word of an object that is not forwarded.
pub fn status(object: ObjectReference) -> StatusWord {
    match header_state(object) {
        HeaderState::Normal(s) => s,
        other => panic!("{} has a forwarding header: {:?}", object, other),
    }
}

pub fn class_id(object: ObjectReference) -> ClassId {
    status(object).class_id()
}

/// Write the header of a new object at `addr`. The memory must be zero.
pub(crate) fn initialize(
    addr: Address,
    class: ClassId,
    length: usize,
    marked: bool,
) -> ObjectReference {
    debug_assert!(!addr.is_zero() && addr.is_aligned_to(MIN_OBJECT_ALIGNMENT));
    let object = unsafe { ObjectReference::from_raw_address_unchecked(addr) };
    if length > 0 {
        word_at(addr + LENGTH_OFFSET).store(length, Ordering::Relaxed);
    }
    store_status_raw(object, StatusWord::new(class).with_mark(marked).raw());
    object
}

pub fn array_length(object: ObjectReference) -> usize {
    word_at(object.to_raw_address() + LENGTH_OFFSET).load(Ordering::Relaxed)
}

/// The size of an object, given its status word. The object may be forwarded;
/// `status` is then the status word saved before it was forwarded.
pub(crate) fn size_with_status(
    object: ObjectReference,
    status: StatusWord,
    classes: &ClassRegistry,
) -> usize {
    let class = status.class_id();
    if class == ClassId::FILLER {
        return BYTES_IN_WORD;
    }
    if class == ClassId::FREE_CHUNK {
        return word_at(object.to_raw_address() + HASH_OFFSET).load(Ordering::Relaxed);
    }
    let length = match classes.expect(class).kind {
        ObjectKind::Instance { .. } | ObjectKind::Reference { .. } => 0,
        _ => array_length(object),
    };
    match classes.expect(class).allocated_size(length) {
        Some(size) => size,
        None => panic!("{} has an impossible size (length {})", object, length),
    }
}

pub fn size_of(object: ObjectReference, classes: &ClassRegistry) -> usize {
    size_with_status(object, status(object), classes)
}

fn visit_ref_slots<F: FnMut(Address)>(
    object: ObjectReference,
    status: StatusWord,
    classes: &ClassRegistry,
    with_referent: bool,
    mut f: F,
) {
    let class = status.class_id();
    if class.is_heap_internal() {
        return;
    }
    let start = object.to_raw_address();
    match &classes.expect(class).kind {
        ObjectKind::Instance { ref_offsets, .. } => {
            for &offset in ref_offsets {
                f(start + offset);
            }
        }
        ObjectKind::Reference {
            ref_offsets,
            referent,
            ..
        } => {
            for &offset in ref_offsets {
                f(start + offset);
            }
            if with_referent {
                f(start + *referent);
            }
        }
        ObjectKind::RefArray => {
            let first = start + ARRAY_HEADER_BYTES;
            for i in 0..array_length(object) {
                f(first + i * BYTES_IN_WORD);
            }
        }
        ObjectKind::PrimitiveArray { .. } => {}
    }
}

/// Call `f` with the address of every reference slot of the object, including the
/// referent of a weak reference.
pub(crate) fn for_each_ref_slot_with_status<F: FnMut(Address)>(
    object: ObjectReference,
    status: StatusWord,
    classes: &ClassRegistry,
    f: F,
) {
    visit_ref_slots(object, status, classes, true, f)
}

/// Like `for_each_ref_slot`, but skips the referent of a weak reference. Full
/// collections trace through these.
pub(crate) fn for_each_strong_ref_slot<F: FnMut(Address)>(
    object: ObjectReference,
    classes: &ClassRegistry,
    f: F,
) {
    visit_ref_slots(object, status(object), classes, false, f)
}

/// The referent slot, if `object` is a weak reference.
pub(crate) fn referent_slot(object: ObjectReference, classes: &ClassRegistry) -> Option<Address> {
    match &classes.get(class_id(object))?.kind {
        ObjectKind::Reference { referent, .. } => Some(object.to_raw_address() + *referent),
        _ => None,
    }
}

pub(crate) fn for_each_ref_slot<F: FnMut(Address)>(
    object: ObjectReference,
    classes: &ClassRegistry,
    f: F,
) {
    for_each_ref_slot_with_status(object, status(object), classes, f)
}

/// Load a reference slot. Acquire pairs with the release in `store_ref`, so a reader
/// that finds an object also sees its initialized header.
pub(crate) fn load_ref(slot: Address) -> Option<ObjectReference> {
    ObjectReference::decode(word_at(slot).load(Ordering::Acquire))
}

pub(crate) fn store_ref(slot: Address, value: Option<ObjectReference>) {
    word_at(slot).store(ObjectReference::encode(value), Ordering::Release)
}

pub fn is_marked(object: ObjectReference) -> bool {
    match header_state(object) {
        HeaderState::Normal(s) => s.is_marked(),
        // Only marked objects get forwarded by the compactor.
        HeaderState::Forwarded(_) | HeaderState::BeingForwarded => true,
    }
}

/// Set the mark bit. Returns true if this call marked the object.
pub(crate) fn try_mark(object: ObjectReference) -> bool {
    let old = status_cell(object).fetch_or(StatusWord::mark_bit(), Ordering::AcqRel);
    debug_assert_eq!(
        old & header::FORWARDING_MASK,
        header::FORWARDING_NOT_TRIGGERED_YET,
        "marking a forwarded object {}",
        object
    );
    old & StatusWord::mark_bit() == 0
}

pub(crate) fn clear_mark(object: ObjectReference) {
    status_cell(object).fetch_and(!StatusWord::mark_bit(), Ordering::AcqRel);
}

/// Pin `object` so the collector keeps it where it is. Returns false if it was
/// already pinned.
pub fn set_pinned(object: ObjectReference) -> bool {
    let old = status_cell(object).fetch_or(StatusWord::pin_bit(), Ordering::AcqRel);
    debug_assert_eq!(old & header::FORWARDING_MASK, header::FORWARDING_NOT_TRIGGERED_YET);
    old & StatusWord::pin_bit() == 0
}

/// Returns false if `object` was not pinned.
pub fn unset_pinned(object: ObjectReference) -> bool {
    let old = status_cell(object).fetch_and(!StatusWord::pin_bit(), Ordering::AcqRel);
    old & StatusWord::pin_bit() != 0
}

pub fn is_pinned(object: ObjectReference) -> bool {
    match header_state(object) {
        HeaderState::Normal(s) => s.is_pinned(),
        HeaderState::Forwarded(_) | HeaderState::BeingForwarded => false,
    }
}

pub fn age(object: ObjectReference) -> u8 {
    status(object).age()
}

/// Describe `[start, end)` as unused memory so the range stays parseable.
pub(crate) fn fill_gap(start: Address, end: Address) {
    let size = end - start;
    debug_assert!(start.is_aligned_to(BYTES_IN_WORD));
    debug_assert!(size % BYTES_IN_WORD == 0);
    match size {
        0 => {}
        BYTES_IN_WORD => {
            word_at(start).store(StatusWord::new(ClassId::FILLER).raw(), Ordering::Relaxed)
        }
        _ => {
            word_at(start + HASH_OFFSET).store(size, Ordering::Relaxed);
            word_at(start).store(StatusWord::new(ClassId::FREE_CHUNK).raw(), Ordering::Release);
        }
    }
}

/// If `addr` starts a free chunk, its size.
pub(crate) fn free_chunk_size(addr: Address) -> Option<usize> {
    let raw = word_at(addr).load(Ordering::Acquire);
    if HeaderState::decode(raw) == HeaderState::Normal(StatusWord::new(ClassId::FREE_CHUNK)) {
        Some(word_at(addr + HASH_OFFSET).load(Ordering::Relaxed))
    } else {
        None
    }
}

/// Copy `size` bytes. The ranges may overlap.
pub(crate) fn copy_bytes(from: Address, to: Address, size: usize) {
    unsafe { std::ptr::copy(from.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), size) }
}

pub(crate) fn zero_bytes(start: Address, size: usize) {
    crate::util::memory::zero(start, size)
}

/// The identity hash. It is assigned on first request and moves with the object.
pub fn identity_hash(object: ObjectReference) -> u64 {
    let cell = word_at(object.to_raw_address() + HASH_OFFSET);
    let current = cell.load(Ordering::Acquire);
    if current != 0 {
        return current as u64;
    }
    let hash = mix(object.to_raw_address().as_usize() as u64).max(1) as usize;
    match cell.compare_exchange(0, hash, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => hash as u64,
        Err(existing) => existing as u64,
    }
}

fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Read a non-reference word at `offset` bytes from the object start.
pub fn read_word(object: ObjectReference, offset: usize) -> usize {
    debug_assert!(offset >= OBJECT_HEADER_BYTES);
    word_at(object.to_raw_address() + offset).load(Ordering::Relaxed)
}

/// Write a non-reference word at `offset` bytes from the object start.
pub fn write_word(object: ObjectReference, offset: usize, value: usize) {
    debug_assert!(offset >= OBJECT_HEADER_BYTES);
    word_at(object.to_raw_address() + offset).store(value, Ordering::Relaxed)
}

/// The byte offset of element `index` of an array of words (references included).
pub const fn array_element_offset(index: usize) -> usize {
    ARRAY_HEADER_BYTES + index * BYTES_IN_WORD
}
