//! Threads and thread coordination: the rendezvous that stops the world, the GC
//! controller thread, and the parallel GC workers.

pub mod controller;
pub mod parallel;
pub mod rendezvous;

pub use controller::GCController;
pub use rendezvous::{MutatorId, MutatorShared, MutatorState, Rendezvous, WorldStopped};
