//! Root handles held by the runtime on behalf of mutators, and global roots.

use crate::util::ObjectReference;
use crate::vm::RootVisitor;

/// A handle to a root slot. The slot keeps its object alive and is updated when
/// the object moves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RootHandle(usize);

/// A table of root slots with slot reuse.
#[derive(Default)]
pub struct RootTable {
    slots: Vec<Option<ObjectReference>>,
    /// Released slots, reused by `add`.
    free: Vec<usize>,
    /// Is the slot in use? Released slots stay `None` in `slots`.
    in_use: Vec<bool>,
}

impl RootTable {
    pub fn add(&mut self, value: Option<ObjectReference>) -> RootHandle {
        if let Some(i) = self.free.pop() {
            self.slots[i] = value;
            self.in_use[i] = true;
            RootHandle(i)
        } else {
            self.slots.push(value);
            self.in_use.push(true);
            RootHandle(self.slots.len() - 1)
        }
    }

    pub fn get(&self, handle: RootHandle) -> Option<ObjectReference> {
        debug_assert!(self.in_use[handle.0], "stale root handle {:?}", handle);
        self.slots[handle.0]
    }

    pub fn set(&mut self, handle: RootHandle, value: Option<ObjectReference>) {
        debug_assert!(self.in_use[handle.0], "stale root handle {:?}", handle);
        self.slots[handle.0] = value;
    }

    pub fn remove(&mut self, handle: RootHandle) {
        if self.in_use[handle.0] {
            self.slots[handle.0] = None;
            self.in_use[handle.0] = false;
            self.free.push(handle.0);
        }
    }

    /// The number of handles in use.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every non-null slot.
    pub fn scan(&mut self, visitor: &mut dyn RootVisitor) {
        for slot in self.slots.iter_mut().filter(|s| s.is_some()) {
            visitor.visit_root(slot);
        }
    }
}
