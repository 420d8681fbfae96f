//! Weak references.
//!
//! A weak reference is an object of a class registered with
//! `ClassInfo::weak_reference`. Full-heap marking does not trace its referent.
//! Instead, every reference object that marking scans becomes a candidate, and
//! once marking is complete the referents that nothing else reached are cleared.
//! Young collections treat referents as strong, so a referent in young space only
//! goes away in a full collection.
//!
//! While concurrent marking runs, mutators must load referents through
//! `Mutator::read_referent`, which keeps the loaded object alive for this cycle.

use crate::object;
use crate::util::ObjectReference;
use crate::vm::ClassRegistry;
use std::sync::Mutex;

#[derive(Default)]
pub struct ReferenceProcessor {
    candidates: Mutex<Vec<ObjectReference>>,
}

impl ReferenceProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember reference objects that marking scanned.
    pub(crate) fn add_candidates(&self, mut references: Vec<ObjectReference>) {
        if !references.is_empty() {
            self.candidates.lock().unwrap().append(&mut references);
        }
    }

    /// Forget the candidates of an abandoned marking.
    pub(crate) fn clear(&self) {
        self.candidates.lock().unwrap().clear();
    }

    #[cfg(test)]
    pub(crate) fn num_candidates(&self) -> usize {
        self.candidates.lock().unwrap().len()
    }

    /// Clear every candidate's referent that is not marked, and forget the
    /// candidates. Marking must be complete. Returns how many were cleared.
    pub(crate) fn scan_weak_refs(&self, classes: &ClassRegistry) -> usize {
        let candidates = std::mem::take(&mut *self.candidates.lock().unwrap());
        let mut cleared = 0;
        for reference in candidates.iter().copied() {
            debug_assert!(object::is_marked(reference), "unmarked candidate {}", reference);
            let Some(slot) = object::referent_slot(reference, classes) else {
                continue;
            };
            if let Some(referent) = object::load_ref(slot) {
                if !object::is_marked(referent) {
                    trace!("Clearing referent {} of {}", referent, reference);
                    object::store_ref(slot, None);
                    cleared += 1;
                }
            }
        }
        debug!("Processed {} weak references, cleared {}", candidates.len(), cleared);
        cleared
    }
}
