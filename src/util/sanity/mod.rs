//! Heap verification. Runs around collections when `verify_heap` is set or the
//! `extreme_assertions` feature is enabled.

mod heap_verifier;

pub(crate) use heap_verifier::{verify_heap, verify_tricolor};
