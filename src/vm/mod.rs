//! The contracts between the heap and the runtime around it.

mod class;
mod scanning;

pub use class::{ClassId, ClassInfo, ClassRegistrationError, ClassRegistry, ObjectKind, MAX_CLASSES};
pub use scanning::{NoScanning, RootVisitor, Scanning};
