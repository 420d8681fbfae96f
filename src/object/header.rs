//! The status word: the first header word of every object.
//!
//! ```text
//! Normal:          | class id (32) | unused (24) | pin (1) | age (4) | mark (1) | 00 |
//! BeingForwarded:  | 0 ...                                           | 10 |
//! Forwarded:       | new address (word aligned)                      | 11 |
//! ```
//!
//! The second header word holds the identity hash, or the size of a free chunk.
//! Array objects keep their length in the third word.

use crate::util::constants::MAX_OBJECT_AGE;
use crate::util::ObjectReference;
use crate::vm::ClassId;
use std::fmt;

pub(crate) const FORWARDING_MASK: usize = 0b11;
pub(crate) const FORWARDING_NOT_TRIGGERED_YET: usize = 0b00;
pub(crate) const BEING_FORWARDED: usize = 0b10;
pub(crate) const FORWARDED: usize = 0b11;
const FORWARDING_POINTER_MASK: usize = !0b111;

const MARK_BIT: usize = 1 << 2;
const AGE_SHIFT: usize = 3;
const AGE_MASK: usize = 0xf << AGE_SHIFT;
const PIN_BIT: usize = 1 << 7;
const CLASS_SHIFT: usize = 32;

/// The status word of an object that is neither being forwarded nor forwarded.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct StatusWord(usize);

impl StatusWord {
    pub fn new(class: ClassId) -> StatusWord {
        StatusWord((class.as_u32() as usize) << CLASS_SHIFT)
    }

    pub(crate) fn from_raw(raw: usize) -> StatusWord {
        debug_assert_eq!(raw & FORWARDING_MASK, FORWARDING_NOT_TRIGGERED_YET);
        StatusWord(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }

    pub fn class_id(self) -> ClassId {
        ClassId::from_u32((self.0 >> CLASS_SHIFT) as u32)
    }

    pub fn is_marked(self) -> bool {
        self.0 & MARK_BIT != 0
    }

    pub fn with_mark(self, marked: bool) -> StatusWord {
        if marked {
            StatusWord(self.0 | MARK_BIT)
        } else {
            StatusWord(self.0 & !MARK_BIT)
        }
    }

    pub fn age(self) -> u8 {
        ((self.0 & AGE_MASK) >> AGE_SHIFT) as u8
    }

    pub fn with_age(self, age: u8) -> StatusWord {
        let age = age.min(MAX_OBJECT_AGE) as usize;
        StatusWord((self.0 & !AGE_MASK) | (age << AGE_SHIFT))
    }

    /// A pinned object is never moved by the collector.
    pub fn is_pinned(self) -> bool {
        self.0 & PIN_BIT != 0
    }

    pub(crate) const fn mark_bit() -> usize {
        MARK_BIT
    }

    pub(crate) const fn pin_bit() -> usize {
        PIN_BIT
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "StatusWord({}, age={}, marked={}, pinned={})",
            self.class_id(),
            self.age(),
            self.is_marked(),
            self.is_pinned()
        )
    }
}

/// A decoded status word. Every reader of the first header word goes through this,
/// so a forwarded header is never mistaken for a class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeaderState {
    Normal(StatusWord),
    /// A GC worker is copying the object right now.
    BeingForwarded,
    Forwarded(ObjectReference),
}

impl HeaderState {
    pub fn decode(raw: usize) -> HeaderState {
        match raw & FORWARDING_MASK {
            FORWARDING_NOT_TRIGGERED_YET => HeaderState::Normal(StatusWord(raw)),
            BEING_FORWARDED => HeaderState::BeingForwarded,
            FORWARDED => match ObjectReference::decode(raw & FORWARDING_POINTER_MASK) {
                Some(new) => HeaderState::Forwarded(new),
                None => panic!("Forwarded header without a forwarding pointer"),
            },
            _ => panic!("Corrupted status word {:#x}", raw),
        }
    }

    pub(crate) fn forwarded_word(new: ObjectReference) -> usize {
        let raw = new.to_raw_address().as_usize();
        debug_assert_eq!(raw & !FORWARDING_POINTER_MASK, 0);
        raw | FORWARDED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    #[test]
    fn status_word_fields() {
        let class = ClassId::from_u32(42);
        let s = StatusWord::new(class);
        assert_eq!(s.class_id(), class);
        assert!(!s.is_marked());
        assert_eq!(s.age(), 0);

        let s = s.with_mark(true).with_age(3);
        assert!(s.is_marked());
        assert_eq!(s.age(), 3);
        assert_eq!(s.class_id(), class);

        let s = s.with_age(200).with_mark(false);
        assert_eq!(s.age(), MAX_OBJECT_AGE);
        assert!(!s.is_marked());
        assert_eq!(HeaderState::decode(s.raw()), HeaderState::Normal(s));

        let pinned = StatusWord::from_raw(s.raw() | StatusWord::pin_bit());
        assert!(pinned.is_pinned());
        assert!(!s.is_pinned());
        assert_eq!(pinned.with_age(2).age(), 2);
        assert!(pinned.with_age(2).with_mark(true).is_pinned());
        assert_eq!(pinned.class_id(), class);
    }

    #[test]
    fn forwarded_round_trip() {
        let new = ObjectReference::from_raw_address(unsafe { Address::from_usize(0x7000_1238) })
            .unwrap();
        let word = HeaderState::forwarded_word(new);
        assert_eq!(HeaderState::decode(word), HeaderState::Forwarded(new));
        assert_eq!(HeaderState::decode(BEING_FORWARDED), HeaderState::BeingForwarded);
    }

    #[test]
    #[should_panic(expected = "Corrupted status word")]
    fn corrupted_word() {
        HeaderState::decode(0b01);
    }
}
