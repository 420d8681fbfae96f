use crate::util::Address;
use atomic::Atomic;
use enum_map::Enum;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use strum_macros::{Display, EnumIter};

/// The space a region currently belongs to.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, Display, EnumIter)]
pub enum SpaceType {
    /// Not handed out. Its memory reads as zero.
    Free,
    /// Eden or survivor regions.
    Young,
    Tenured,
    /// A humongous object spans one or more regions.
    Humongous,
    /// Runtime metadata from the run-slots allocator. Not scanned by the GC.
    Internal,
}

impl SpaceType {
    fn from_u8(v: u8) -> SpaceType {
        match v {
            0 => SpaceType::Free,
            1 => SpaceType::Young,
            2 => SpaceType::Tenured,
            3 => SpaceType::Humongous,
            4 => SpaceType::Internal,
            _ => unreachable!("corrupted space type {}", v),
        }
    }

    /// Does the GC trace objects in this space?
    pub fn is_heap(self) -> bool {
        matches!(
            self,
            SpaceType::Young | SpaceType::Tenured | SpaceType::Humongous
        )
    }
}

/// Which allocator carved the region up.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum AllocatorKind {
    None,
    /// Eden TLABs and survivor copy buffers.
    Bump,
    FreeList,
    Humongous,
    RunSlots,
}

impl AllocatorKind {
    fn from_u8(v: u8) -> AllocatorKind {
        match v {
            0 => AllocatorKind::None,
            1 => AllocatorKind::Bump,
            2 => AllocatorKind::FreeList,
            3 => AllocatorKind::Humongous,
            4 => AllocatorKind::RunSlots,
            _ => unreachable!("corrupted allocator kind {}", v),
        }
    }
}

/// Region flag bits.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct RegionFlags(u8);

impl RegionFlags {
    pub const NONE: RegionFlags = RegionFlags(0);
    /// Young region that mutators allocate into.
    pub const EDEN: RegionFlags = RegionFlags(1 << 0);
    /// Young region that holds objects which survived a young GC.
    pub const SURVIVOR: RegionFlags = RegionFlags(1 << 1);
    /// A tenured region that used to be young and was promoted without copying.
    pub const PROMOTED: RegionFlags = RegionFlags(1 << 2);
    /// A humongous region that continues the object started in an earlier region.
    pub const HUMONGOUS_CONT: RegionFlags = RegionFlags(1 << 3);
    /// Part of the collection set of the running young GC.
    pub const IN_CSET: RegionFlags = RegionFlags(1 << 4);
    /// Some objects in this region could not be evacuated.
    pub const EVAC_FAILED: RegionFlags = RegionFlags(1 << 5);
    /// A young collection left pinned objects in this region.
    pub const PINNED: RegionFlags = RegionFlags(1 << 6);

    pub fn contains(self, other: RegionFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RegionFlags {
    type Output = RegionFlags;
    fn bitor(self, rhs: RegionFlags) -> RegionFlags {
        RegionFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for RegionFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [&str; 7] = [
            "EDEN",
            "SURVIVOR",
            "PROMOTED",
            "HUMONGOUS_CONT",
            "IN_CSET",
            "EVAC_FAILED",
            "PINNED",
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, n)| *n)
            .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// Index of a region in the pool. The region's memory is `heap_start + (id << log_region_size)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub(crate) u32);

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Per-region metadata. All of it is atomic: barriers and allocators read it
/// outside of any lock, and the GC updates it from several workers.
pub struct Region {
    space: AtomicU8,
    owner: AtomicU8,
    flags: AtomicU8,
    /// Objects are parseable from the region start up to `top`.
    top: Atomic<Address>,
    /// Bytes found live by the last marking.
    live_bytes: AtomicUsize,
    /// For humongous regions: the number of regions the object spans (on the first region only).
    span: AtomicU32,
}

impl Region {
    pub(crate) fn new(start: Address) -> Region {
        Region {
            space: AtomicU8::new(SpaceType::Free as u8),
            owner: AtomicU8::new(AllocatorKind::None as u8),
            flags: AtomicU8::new(0),
            top: Atomic::new(start),
            live_bytes: AtomicUsize::new(0),
            span: AtomicU32::new(0),
        }
    }

    pub fn space(&self) -> SpaceType {
        SpaceType::from_u8(self.space.load(Ordering::Acquire))
    }

    pub(crate) fn set_space(&self, space: SpaceType) {
        self.space.store(space as u8, Ordering::Release);
    }

    pub fn owner(&self) -> AllocatorKind {
        AllocatorKind::from_u8(self.owner.load(Ordering::Relaxed))
    }

    pub(crate) fn set_owner(&self, owner: AllocatorKind) {
        self.owner.store(owner as u8, Ordering::Relaxed);
    }

    pub fn flags(&self) -> RegionFlags {
        RegionFlags(self.flags.load(Ordering::Acquire))
    }

    pub fn has_flag(&self, flag: RegionFlags) -> bool {
        self.flags().contains(flag)
    }

    pub(crate) fn insert_flag(&self, flag: RegionFlags) {
        self.flags.fetch_or(flag.0, Ordering::AcqRel);
    }

    pub(crate) fn remove_flag(&self, flag: RegionFlags) {
        self.flags.fetch_and(!flag.0, Ordering::AcqRel);
    }

    pub(crate) fn set_flags(&self, flags: RegionFlags) {
        self.flags.store(flags.0, Ordering::Release);
    }

    pub fn top(&self) -> Address {
        self.top.load(Ordering::Acquire)
    }

    pub(crate) fn set_top(&self, top: Address) {
        self.top.store(top, Ordering::Release);
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_live_bytes(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn reset_live_bytes(&self) {
        self.live_bytes.store(0, Ordering::Relaxed);
    }

    pub fn span(&self) -> usize {
        self.span.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn set_span(&self, span: usize) {
        self.span.store(span as u32, Ordering::Relaxed);
    }

    /// Reset everything but the memory. Called when the region goes back to the pool.
    pub(crate) fn reset(&self, start: Address) {
        self.set_flags(RegionFlags::NONE);
        self.set_owner(AllocatorKind::None);
        self.set_top(start);
        self.reset_live_bytes();
        self.set_span(0);
        self.set_space(SpaceType::Free);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let r = Region::new(Address::ZERO);
        r.insert_flag(RegionFlags::EDEN | RegionFlags::IN_CSET);
        assert!(r.has_flag(RegionFlags::EDEN));
        assert!(r.has_flag(RegionFlags::IN_CSET));
        assert!(!r.has_flag(RegionFlags::SURVIVOR));
        r.remove_flag(RegionFlags::IN_CSET);
        assert!(!r.has_flag(RegionFlags::IN_CSET));
        assert_eq!(format!("{:?}", r.flags()), "[EDEN]");
        r.insert_flag(RegionFlags::PINNED);
        assert_eq!(format!("{:?}", r.flags()), "[EDEN|PINNED]");
    }

    #[test]
    fn reset() {
        let start = unsafe { Address::from_usize(0x10000) };
        let r = Region::new(start);
        r.set_space(SpaceType::Tenured);
        r.set_top(start + 64);
        r.add_live_bytes(48);
        r.reset(start);
        assert_eq!(r.space(), SpaceType::Free);
        assert_eq!(r.top(), start);
        assert_eq!(r.live_bytes(), 0);
    }
}
