use crate::object::{self, header::HeaderState};
use crate::util::constants::BYTES_IN_WORD;
use crate::util::{Address, ObjectReference};
use crate::vm::ClassRegistry;

/// One parseable cell of a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cell {
    /// An object of a user class.
    Object(ObjectReference, usize),
    /// A free chunk, a filler word, or a zero word (an unformatted hole).
    Free(Address, usize),
}

/// Walk `[start, end)` cell by cell. The range must not contain forwarded objects,
/// and nobody may be allocating into it.
pub struct CellIterator<'a> {
    cursor: Address,
    end: Address,
    classes: &'a ClassRegistry,
}

impl<'a> CellIterator<'a> {
    pub fn new(start: Address, end: Address, classes: &'a ClassRegistry) -> Self {
        debug_assert!(start <= end);
        CellIterator {
            cursor: start,
            end,
            classes,
        }
    }

    /// Only the objects.
    pub fn objects(self) -> impl Iterator<Item = ObjectReference> + 'a {
        self.filter_map(|c| match c {
            Cell::Object(o, _) => Some(o),
            Cell::Free(..) => None,
        })
    }
}

impl Iterator for CellIterator<'_> {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let raw = unsafe { start.load::<usize>() };
        let cell = if raw == 0 {
            Cell::Free(start, BYTES_IN_WORD)
        } else {
            let object = unsafe { ObjectReference::from_raw_address_unchecked(start) };
            let status = match HeaderState::decode(raw) {
                HeaderState::Normal(s) => s,
                other => panic!("Linear scan found {} with a {:?} header", start, other),
            };
            let size = object::size_with_status(object, status, self.classes);
            if status.class_id().is_heap_internal() {
                Cell::Free(start, size)
            } else {
                Cell::Object(object, size)
            }
        };
        let size = match cell {
            Cell::Object(_, size) | Cell::Free(_, size) => size,
        };
        debug_assert!(size > 0 && start + size <= self.end, "bad cell at {}", start);
        self.cursor = start + size;
        Some(cell)
    }
}
