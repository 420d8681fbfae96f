//! Utilities shared by the heap, the spaces and the collectors.

pub mod address;
pub mod alloc;
pub mod card_table;
pub mod constants;
pub mod conversions;
pub mod heap;
pub mod linear_scan;
pub mod logger;
pub mod memory;
pub mod object_forwarding;
pub mod options;
pub(crate) mod panic;
pub mod reference_processor;
pub mod statistics;

pub(crate) mod sanity;

#[cfg(any(test, feature = "test_private"))]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
