//! The forwarding protocol used by the copying and compacting collectors.
//!
//! A worker that wants to copy an object first claims it by swapping its status word
//! for `BEING_FORWARDED`. Only the winner copies. It then publishes the new address
//! with a release store of a `Forwarded` status word. Losers spin until they see it.

use crate::object::header::{HeaderState, StatusWord, BEING_FORWARDED};
use crate::object::{self};
use crate::util::ObjectReference;

/// The result of trying to claim an object for forwarding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForwardingClaim {
    /// We won. The object's previous status word, needed to build the copy.
    Won(StatusWord),
    /// Another worker forwarded (or is forwarding) the object to this address.
    AlreadyForwarded(ObjectReference),
}

/// Attempt to become the worker that forwards `object`.
pub fn attempt_to_forward(object: ObjectReference) -> ForwardingClaim {
    loop {
        let old = object::load_status_raw(object);
        match HeaderState::decode(old) {
            HeaderState::Normal(status) => {
                if object::compare_exchange_status(object, old, BEING_FORWARDED).is_ok() {
                    return ForwardingClaim::Won(status);
                }
            }
            HeaderState::BeingForwarded | HeaderState::Forwarded(_) => {
                return ForwardingClaim::AlreadyForwarded(spin_and_get_forwarded_object(object));
            }
        }
    }
}

/// Spin until the forwarding of `object` completes, then return the new object.
pub fn spin_and_get_forwarded_object(object: ObjectReference) -> ObjectReference {
    loop {
        match object::header_state(object) {
            HeaderState::Forwarded(new) => return new,
            HeaderState::BeingForwarded => std::hint::spin_loop(),
            HeaderState::Normal(_) => {
                // The winner gave up and restored the header (we never do this while
                // other workers can observe the object), so treat it as not moved.
                return object;
            }
        }
    }
}

/// Publish the forwarding pointer. `object` must have been claimed with `attempt_to_forward`
/// (young GC), or be owned exclusively by the caller (compaction).
pub fn forward_object(object: ObjectReference, new_object: ObjectReference) {
    trace!("forward_object({}, {})", object, new_object);
    object::store_status_raw(object, HeaderState::forwarded_word(new_object));
}

/// Put back a status word saved before the object was forwarded.
pub fn restore_status(object: ObjectReference, status: StatusWord) {
    object::store_status_raw(object, status.raw());
}

pub fn is_forwarded(object: ObjectReference) -> bool {
    matches!(object::header_state(object), HeaderState::Forwarded(_))
}

/// Where a reference to `object` should point now. Objects that were not forwarded
/// resolve to themselves. One hop only: a forwarding target is never itself forwarded
/// within the same collection, but may sit at another forwarded object's old address.
pub fn resolve(object: ObjectReference) -> ObjectReference {
    match object::header_state(object) {
        HeaderState::Forwarded(new) => new,
        HeaderState::BeingForwarded => spin_and_get_forwarded_object(object),
        HeaderState::Normal(_) => object,
    }
}
