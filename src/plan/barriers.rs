//! Read/write barriers.

use crate::object;
use crate::plan::generational::marking::SatbQueue;
use crate::util::card_table::CardTable;
use crate::util::heap::{RegionPool, SpaceType};
use crate::util::{Address, ObjectReference};
use std::sync::Arc;

/// Which barrier mutators use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BarrierSelector {
    NoBarrier,
    /// Card marking, plus a snapshot-at-the-beginning pre-barrier while marking is active.
    Generational,
}

/// The mutator side of a reference store or load. `src` is the object holding `slot`.
///
/// One barrier instance belongs to one mutator, so it may buffer work locally;
/// `flush` publishes the buffer. The mutator flushes before it stops at a safepoint.
pub trait Barrier: Send {
    fn flush(&mut self) {}

    /// Called before the store. `slot` still holds the old value.
    fn object_reference_write_pre(
        &mut self,
        _src: ObjectReference,
        _slot: Address,
        _target: Option<ObjectReference>,
    ) {
    }

    /// Called after the store.
    fn object_reference_write_post(
        &mut self,
        _src: ObjectReference,
        _slot: Address,
        _target: Option<ObjectReference>,
    ) {
    }

    /// A full reference store with both barriers.
    #[inline(always)]
    fn object_reference_write(
        &mut self,
        src: ObjectReference,
        slot: Address,
        target: Option<ObjectReference>,
    ) {
        self.object_reference_write_pre(src, slot, target);
        object::store_ref(slot, target);
        self.object_reference_write_post(src, slot, target);
    }

    /// A reference load. Objects never move while mutators run, so this is a plain load.
    #[inline(always)]
    fn object_reference_read(
        &mut self,
        _src: ObjectReference,
        slot: Address,
    ) -> Option<ObjectReference> {
        object::load_ref(slot)
    }

    /// A load of the referent of a weak reference.
    #[inline(always)]
    fn weak_reference_read(&mut self, slot: Address) -> Option<ObjectReference> {
        object::load_ref(slot)
    }
}

pub struct NoBarrier;

impl Barrier for NoBarrier {}

/// Entries buffered before the pre-barrier publishes them.
const SATB_BUFFER_CAPACITY: usize = 256;

pub struct GenerationalBarrier {
    pool: Arc<RegionPool>,
    card_table: Arc<CardTable>,
    satb: Arc<SatbQueue>,
    satb_buffer: Vec<ObjectReference>,
}

impl GenerationalBarrier {
    pub fn new(pool: Arc<RegionPool>, card_table: Arc<CardTable>, satb: Arc<SatbQueue>) -> Self {
        GenerationalBarrier {
            pool,
            card_table,
            satb,
            satb_buffer: Vec::with_capacity(SATB_BUFFER_CAPACITY),
        }
    }

    #[cold]
    fn enqueue_old_value(&mut self, old: ObjectReference) {
        self.satb_buffer.push(old);
        if self.satb_buffer.len() >= SATB_BUFFER_CAPACITY {
            self.flush();
        }
    }
}

impl Barrier for GenerationalBarrier {
    fn flush(&mut self) {
        if !self.satb.is_active() {
            self.satb_buffer.clear();
        } else if !self.satb_buffer.is_empty() {
            let buffer = std::mem::replace(
                &mut self.satb_buffer,
                Vec::with_capacity(SATB_BUFFER_CAPACITY),
            );
            self.satb.push_buffer(buffer);
        }
    }

    #[inline(always)]
    fn object_reference_write_pre(
        &mut self,
        _src: ObjectReference,
        slot: Address,
        _target: Option<ObjectReference>,
    ) {
        if self.satb.is_active() {
            if let Some(old) = object::load_ref(slot) {
                if !object::is_marked(old) {
                    self.enqueue_old_value(old);
                }
            }
        }
    }

    #[inline(always)]
    fn object_reference_write_post(
        &mut self,
        src: ObjectReference,
        _slot: Address,
        target: Option<ObjectReference>,
    ) {
        if target.is_none() {
            return;
        }
        let addr = src.to_raw_address();
        if matches!(
            self.pool.space_of(addr),
            SpaceType::Tenured | SpaceType::Humongous
        ) && !self.card_table.is_card_dirty(addr)
        {
            self.card_table.mark_card(addr);
        }
    }

    /// While marking, a loaded referent is logged like an overwritten value, so the
    /// marking reaches it even if the reference was only weak.
    #[inline(always)]
    fn weak_reference_read(&mut self, slot: Address) -> Option<ObjectReference> {
        let referent = object::load_ref(slot);
        if self.satb.is_active() {
            if let Some(object) = referent {
                if !object::is_marked(object) {
                    self.enqueue_old_value(object);
                }
            }
        }
        referent
    }
}
