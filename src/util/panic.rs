//! Panics inside a collection leave the heap half-collected and the cycle lock
//! poisoned. Nothing can recover from that, so the process aborts.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Run `f`, aborting the process if it panics.
pub(crate) fn abort_on_panic<R>(what: &str, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(payload) => {
            error!("===== Internal error in gengc =====");
            error!("{} panicked: {}", what, panic_message(payload.as_ref()));
            std::process::abort()
        }
    }
}
