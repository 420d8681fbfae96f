//! The card table remembers which parts of the heap may hold references into the
//! young generation. The generational write barrier dirties the card covering the
//! source object. A young GC takes the dirty cards of a region, scans every object
//! that starts on one of them, and re-dirties a card if its objects still refer to
//! young objects.

use crate::util::constants::{BYTES_IN_CARD, LOG_BYTES_IN_CARD};
use crate::util::conversions;
use crate::util::Address;
use std::sync::atomic::{AtomicU8, Ordering};

pub struct CardTable {
    base: Address,
    cards: Box<[AtomicU8]>,
}

impl CardTable {
    pub const CARD_CLEAN: u8 = 0;
    pub const CARD_DIRTY: u8 = 1;

    /// A card table for the heap range `[base, base + heap_bytes)`.
    pub fn new(base: Address, heap_bytes: usize) -> CardTable {
        let count = conversions::units_up(heap_bytes, LOG_BYTES_IN_CARD);
        CardTable {
            base,
            cards: (0..count)
                .map(|_| AtomicU8::new(Self::CARD_CLEAN))
                .collect(),
        }
    }

    fn card_index(&self, addr: Address) -> usize {
        debug_assert!(addr >= self.base, "{} is below the heap", addr);
        (addr - self.base) >> LOG_BYTES_IN_CARD
    }

    /// The first address covered by the card that covers `addr`.
    pub fn card_start(&self, addr: Address) -> Address {
        self.base + (self.card_index(addr) << LOG_BYTES_IN_CARD)
    }

    pub fn num_cards(&self) -> usize {
        self.cards.len()
    }

    /// Dirty the card covering `addr`. Stores in the same card race benignly.
    #[inline(always)]
    pub fn mark_card(&self, addr: Address) {
        let card = &self.cards[self.card_index(addr)];
        // Skip the store if it is already dirty, to keep the cache line shared.
        if card.load(Ordering::Relaxed) != Self::CARD_DIRTY {
            card.store(Self::CARD_DIRTY, Ordering::Relaxed);
        }
    }

    pub fn is_card_dirty(&self, addr: Address) -> bool {
        self.cards[self.card_index(addr)].load(Ordering::Relaxed) == Self::CARD_DIRTY
    }

    /// Clean the card covering `addr`, returning whether it was dirty.
    pub fn clear_card(&self, addr: Address) -> bool {
        self.cards[self.card_index(addr)].swap(Self::CARD_CLEAN, Ordering::Relaxed)
            == Self::CARD_DIRTY
    }

    /// Clean the dirty cards in `[start, end)` and return their start addresses,
    /// in ascending order.
    pub fn take_dirty(&self, start: Address, end: Address) -> Vec<Address> {
        self.card_range(start, end)
            .filter(|&i| {
                self.cards[i].swap(Self::CARD_CLEAN, Ordering::Relaxed) == Self::CARD_DIRTY
            })
            .map(|i| self.base + (i << LOG_BYTES_IN_CARD))
            .collect()
    }

    /// Is any card in `[start, end)` dirty?
    pub fn any_dirty(&self, start: Address, end: Address) -> bool {
        self.card_range(start, end)
            .any(|i| self.cards[i].load(Ordering::Relaxed) == Self::CARD_DIRTY)
    }

    /// Clean all cards in `[start, end)`.
    pub fn clear_range(&self, start: Address, end: Address) {
        for i in self.card_range(start, end) {
            self.cards[i].store(Self::CARD_CLEAN, Ordering::Relaxed);
        }
    }

    pub fn clear_all(&self) {
        for card in self.cards.iter() {
            card.store(Self::CARD_CLEAN, Ordering::Relaxed);
        }
    }

    /// Number of dirty cards in the whole table.
    pub fn count_dirty(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) == Self::CARD_DIRTY)
            .count()
    }

    fn card_range(&self, start: Address, end: Address) -> std::ops::Range<usize> {
        if end <= start {
            return 0..0;
        }
        let first = self.card_index(start);
        let last = self.card_index(end.align_up(BYTES_IN_CARD) - BYTES_IN_CARD);
        first..(last + 1).min(self.cards.len())
    }
}
