//! Spaces: sets of regions with an allocation and reclamation policy.

pub mod internal_space;
pub mod large_object_space;
pub mod space;
pub mod tenured_space;
pub mod young_space;

pub use internal_space::InternalSpace;
pub use large_object_space::LargeObjectSpace;
pub use space::Space;
pub use tenured_space::TenuredSpace;
pub use young_space::YoungSpace;
