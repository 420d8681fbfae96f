use crate::scheduler::MutatorId;
use crate::util::ObjectReference;

/// Receives root slots. The collector may rewrite a slot when its object moves.
pub trait RootVisitor {
    fn visit_root(&mut self, slot: &mut Option<ObjectReference>);
}

impl<F: FnMut(&mut Option<ObjectReference>)> RootVisitor for F {
    fn visit_root(&mut self, slot: &mut Option<ObjectReference>) {
        self(slot)
    }
}

/// Root enumeration supplied by the runtime (interpreter frames, compiled code
/// root maps, class statics, ...). It is only called while the world is stopped.
pub trait Scanning: Send + Sync {
    /// Visit the roots in the frames of one mutator.
    fn scan_mutator_roots(&self, _mutator: MutatorId, _visitor: &mut dyn RootVisitor) {}

    /// Visit roots that do not belong to a thread.
    fn scan_global_roots(&self, _visitor: &mut dyn RootVisitor) {}
}

/// For runtimes that keep all their roots in root handles.
pub struct NoScanning;

impl Scanning for NoScanning {}
