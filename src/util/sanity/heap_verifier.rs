use crate::heap::HeapContext;
use crate::object::{self, header::HeaderState};
use crate::plan::generational::marking::RootCollector;
use crate::util::heap::{RegionFlags, SpaceType};
use crate::util::ObjectReference;
use std::collections::HashSet;

/// Stop collecting problems after this many; the first ones are the interesting ones.
const MAX_PROBLEMS: usize = 32;

struct Problems(Vec<String>);

impl Problems {
    fn report(&mut self, problem: impl FnOnce() -> String) {
        if self.0.len() < MAX_PROBLEMS {
            self.0.push(problem());
        }
    }

    fn full(&self) -> bool {
        self.0.len() >= MAX_PROBLEMS
    }
}

/// Check one object that is reachable. Returns false if it must not be scanned.
fn check_object(heap: &HeapContext, object: ObjectReference, problems: &mut Problems) -> bool {
    let addr = object.to_raw_address();
    let Some(region) = heap.pool.region_of(addr) else {
        problems.report(|| format!("{} is outside the heap", object));
        return false;
    };
    match region.space() {
        SpaceType::Young | SpaceType::Tenured | SpaceType::Humongous => {}
        space => {
            problems.report(|| format!("{} is in a {} region", object, space));
            return false;
        }
    }
    if region.has_flag(RegionFlags::HUMONGOUS_CONT) {
        problems.report(|| format!("{} points into the middle of a humongous object", object));
        return false;
    }
    if addr >= region.top() {
        problems.report(|| format!("{} is above the top of its region ({})", object, region.top()));
        return false;
    }
    if region.has_flag(RegionFlags::IN_CSET) {
        problems.report(|| format!("{} is in the collection set outside a young GC", object));
    }
    match object::header_state(object) {
        HeaderState::Normal(_) => {}
        state => {
            problems.report(|| format!("{} has a {:?} header", object, state));
            return false;
        }
    }
    let class = object::class_id(object);
    if class.is_heap_internal() || heap.classes.get(class).is_none() {
        problems.report(|| format!("{} has an invalid class {}", object, class));
        return false;
    }
    true
}

/// Verify everything reachable from the roots: every reference points at the
/// start of a valid object in a live heap region, and tenured or humongous
/// objects that point into young space are on dirty cards.
///
/// Unreachable objects are not checked.
pub(crate) fn verify_heap(heap: &HeapContext) -> Vec<String> {
    let mut problems = Problems(vec![]);
    let mut roots = RootCollector(vec![]);
    heap.visit_roots(&mut roots);

    let mut visited: HashSet<ObjectReference> = HashSet::new();
    let mut stack = vec![];
    for root in roots.0 {
        if visited.insert(root) {
            stack.push(root);
        }
    }
    while let Some(object) = stack.pop() {
        if problems.full() {
            break;
        }
        if !check_object(heap, object, &mut problems) {
            continue;
        }
        let source_space = heap.pool.space_of(object.to_raw_address());
        let mut points_young = false;
        object::for_each_ref_slot(object, &heap.classes, |slot| {
            if let Some(target) = object::load_ref(slot) {
                points_young |= heap.pool.space_of(target.to_raw_address()) == SpaceType::Young;
                if visited.insert(target) {
                    stack.push(target);
                }
            }
        });
        if points_young
            && source_space != SpaceType::Young
            && !heap.card_table.is_card_dirty(object.to_raw_address())
        {
            problems.report(|| {
                format!(
                    "{} in {} space points into young space but its card is clean",
                    object, source_space
                )
            });
        }
    }
    trace!("Verified {} reachable objects", visited.len());
    problems.0
}

/// After marking: no marked object may point at an unmarked one.
pub(crate) fn verify_tricolor(heap: &HeapContext) -> Vec<String> {
    let mut problems = Problems(vec![]);
    heap.walk_objects(&mut |object| {
        if !object::is_marked(object) {
            return;
        }
        object::for_each_ref_slot(object, &heap.classes, |slot| {
            if let Some(target) = object::load_ref(slot) {
                if !object::is_marked(target) {
                    problems.report(|| format!("marked {} points at unmarked {}", object, target));
                }
            }
        });
    });
    let mut roots = RootCollector(vec![]);
    heap.visit_roots(&mut roots);
    for root in roots.0 {
        if !object::is_marked(root) {
            problems.report(|| format!("root {} is not marked", root));
        }
    }
    problems.0
}
