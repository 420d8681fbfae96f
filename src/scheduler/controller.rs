//! The GC controller thread.
//!
//! The controller picks up queued collection requests and runs them, and issues
//! periodic GC hints if configured. It only holds a weak reference to the heap, so
//! dropping the last handle to the heap shuts it down.

use crate::heap::HeapContext;
use crate::plan::gc_requester::{GCRequester, NextTask};
use crate::plan::{GcCause, Generation};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const CONTROLLER_THREAD_NAME: &str = "gengc-controller";

pub struct GCController {
    heap: Weak<HeapContext>,
    requester: Arc<GCRequester>,
    periodic: Option<Duration>,
}

impl GCController {
    pub fn new(
        heap: Weak<HeapContext>,
        requester: Arc<GCRequester>,
        periodic: Option<Duration>,
    ) -> Self {
        GCController {
            heap,
            requester,
            periodic,
        }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(CONTROLLER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    pub fn run(&self) {
        loop {
            debug!("[Controller: Waiting for request...]");
            match self.requester.next_task(self.periodic) {
                NextTask::Run(task) => {
                    debug!("[Controller: Request received: {:?}]", task);
                    match self.heap.upgrade() {
                        Some(heap) => heap.run_gc_task(task),
                        None => {
                            self.requester.finish(task, None);
                            break;
                        }
                    }
                }
                NextTask::Timeout => {
                    trace!("[Controller: Periodic GC hint]");
                    self.requester.request(GcCause::Periodic, Generation::Young);
                }
                NextTask::Shutdown => break,
            }
        }
        debug!("[Controller: Exit]");
    }
}

/// Is the current thread the controller?
pub fn is_controller_thread() -> bool {
    thread::current().name() == Some(CONTROLLER_THREAD_NAME)
}
