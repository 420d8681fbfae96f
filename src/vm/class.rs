//! Class metadata supplied by the runtime's class loader.
//!
//! The collector only needs to know how big an object is and where its reference
//! fields are. Classes are registered once and never change, so the collector
//! reads them without taking a lock.

use crate::util::constants::*;
use crate::util::conversions;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

/// The maximum number of classes a heap can register.
pub const MAX_CLASSES: usize = 4096;

/// Identifies a registered class. Stored in every object header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// Never registered. A zero header word decodes to this class.
    pub const INVALID: ClassId = ClassId(0);
    /// A dead range the allocators may reuse. Its size is in the second header word.
    pub(crate) const FREE_CHUNK: ClassId = ClassId(1);
    /// A single unused word.
    pub(crate) const FILLER: ClassId = ClassId(2);
    const FIRST_USER: u32 = 3;

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn from_u32(raw: u32) -> ClassId {
        ClassId(raw)
    }

    /// Is this one of the classes the heap uses to describe unused memory?
    pub fn is_heap_internal(self) -> bool {
        self == ClassId::FREE_CHUNK || self == ClassId::FILLER
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// The shape of the objects of a class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// A fixed-size object. `size` includes the two header words. Each entry in
    /// `ref_offsets` is the byte offset of a reference field from the object start.
    Instance { size: usize, ref_offsets: Vec<usize> },
    /// A weak reference object: an instance whose `referent` field does not keep
    /// its target alive across a full collection. Young collections treat it as
    /// strong.
    Reference {
        size: usize,
        ref_offsets: Vec<usize>,
        referent: usize,
    },
    /// An array whose elements are all references.
    RefArray,
    /// An array of non-reference elements of `element_size` bytes.
    PrimitiveArray { element_size: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ObjectKind,
}

impl ClassInfo {
    pub fn instance(name: &str, size: usize, ref_offsets: &[usize]) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            kind: ObjectKind::Instance {
                size,
                ref_offsets: ref_offsets.to_vec(),
            },
        }
    }

    pub fn weak_reference(
        name: &str,
        size: usize,
        ref_offsets: &[usize],
        referent: usize,
    ) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            kind: ObjectKind::Reference {
                size,
                ref_offsets: ref_offsets.to_vec(),
                referent,
            },
        }
    }

    pub fn ref_array(name: &str) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            kind: ObjectKind::RefArray,
        }
    }

    pub fn primitive_array(name: &str, element_size: usize) -> ClassInfo {
        ClassInfo {
            name: name.to_string(),
            kind: ObjectKind::PrimitiveArray { element_size },
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::RefArray | ObjectKind::PrimitiveArray { .. }
        )
    }

    /// The number of bytes a caller asks for. Used to pick an allocator, so it is not rounded.
    pub fn requested_size(&self, length: usize) -> Option<usize> {
        match &self.kind {
            ObjectKind::Instance { size, .. } | ObjectKind::Reference { size, .. } => Some(*size),
            ObjectKind::RefArray => length
                .checked_mul(BYTES_IN_WORD)?
                .checked_add(ARRAY_HEADER_BYTES),
            ObjectKind::PrimitiveArray { element_size } => length
                .checked_mul(*element_size)?
                .checked_add(ARRAY_HEADER_BYTES),
        }
    }

    /// The number of bytes an object of this class occupies in the heap.
    pub fn allocated_size(&self, length: usize) -> Option<usize> {
        let requested = self.requested_size(length)?;
        if requested > isize::MAX as usize - MIN_OBJECT_ALIGNMENT {
            return None;
        }
        Some(conversions::object_size_align_up(requested))
    }

    fn check_field(&self, size: usize, offset: usize) -> Result<(), ClassRegistrationError> {
        if offset < OBJECT_HEADER_BYTES
            || !conversions::raw_is_aligned(offset, BYTES_IN_WORD)
            || offset + BYTES_IN_WORD > size
        {
            return Err(ClassRegistrationError::InvalidLayout(format!(
                "{}: bad reference field offset {}",
                self.name, offset
            )));
        }
        Ok(())
    }

    fn check_instance(
        &self,
        size: usize,
        ref_offsets: &[usize],
    ) -> Result<(), ClassRegistrationError> {
        if size < OBJECT_HEADER_BYTES {
            return Err(ClassRegistrationError::InvalidLayout(format!(
                "{}: size {} is smaller than the header",
                self.name, size
            )));
        }
        for &offset in ref_offsets {
            self.check_field(size, offset)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ClassRegistrationError> {
        match &self.kind {
            ObjectKind::Instance { size, ref_offsets } => self.check_instance(*size, ref_offsets),
            ObjectKind::Reference {
                size,
                ref_offsets,
                referent,
            } => {
                self.check_instance(*size, ref_offsets)?;
                self.check_field(*size, *referent)?;
                if ref_offsets.contains(referent) {
                    return Err(ClassRegistrationError::InvalidLayout(format!(
                        "{}: referent {} is also a strong field",
                        self.name, referent
                    )));
                }
                Ok(())
            }
            ObjectKind::RefArray => Ok(()),
            ObjectKind::PrimitiveArray { element_size } => {
                if matches!(element_size, 1 | 2 | 4 | 8) {
                    Ok(())
                } else {
                    Err(ClassRegistrationError::InvalidLayout(format!(
                        "{}: unsupported element size {}",
                        self.name, element_size
                    )))
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassRegistrationError {
    TooManyClasses,
    InvalidLayout(String),
}

impl fmt::Display for ClassRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClassRegistrationError::TooManyClasses => {
                write!(f, "cannot register more than {} classes", MAX_CLASSES)
            }
            ClassRegistrationError::InvalidLayout(msg) => {
                write!(f, "invalid class layout: {}", msg)
            }
        }
    }
}

impl std::error::Error for ClassRegistrationError {}

/// Append-only table of classes.
pub struct ClassRegistry {
    classes: Box<[OnceLock<ClassInfo>]>,
    next: AtomicU32,
    register_lock: Mutex<()>,
}

impl ClassRegistry {
    pub fn new() -> ClassRegistry {
        ClassRegistry {
            classes: (0..MAX_CLASSES).map(|_| OnceLock::new()).collect(),
            next: AtomicU32::new(ClassId::FIRST_USER),
            register_lock: Mutex::new(()),
        }
    }

    pub fn register(&self, info: ClassInfo) -> Result<ClassId, ClassRegistrationError> {
        info.validate()?;
        let _guard = self.register_lock.lock().unwrap();
        let id = self.next.load(Ordering::Relaxed);
        if id as usize >= MAX_CLASSES {
            return Err(ClassRegistrationError::TooManyClasses);
        }
        debug!("Registered {} as class#{}", info.name, id);
        let set = self.classes[id as usize].set(info);
        debug_assert!(set.is_ok());
        self.next.store(id + 1, Ordering::Release);
        Ok(ClassId(id))
    }

    /// The class for `id`, if it is a registered user class.
    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.0 as usize).and_then(|c| c.get())
    }

    /// Like `get`, but a missing class is a corrupted heap.
    pub(crate) fn expect(&self, id: ClassId) -> &ClassInfo {
        match self.get(id) {
            Some(info) => info,
            None => panic!("Object with unregistered {}", id),
        }
    }

    pub fn len(&self) -> usize {
        (self.next.load(Ordering::Acquire) - ClassId::FIRST_USER) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let registry = ClassRegistry::new();
        let node = registry
            .register(ClassInfo::instance("Node", 32, &[16, 24]))
            .unwrap();
        let bytes = registry
            .register(ClassInfo::primitive_array("byte[]", 1))
            .unwrap();
        assert_ne!(node, bytes);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(node).unwrap().name, "Node");
        assert!(registry.get(ClassId::INVALID).is_none());
        assert!(registry.get(ClassId::FREE_CHUNK).is_none());
    }

    #[test]
    fn reject_bad_layouts() {
        let registry = ClassRegistry::new();
        assert!(registry.register(ClassInfo::instance("Tiny", 8, &[])).is_err());
        assert!(registry
            .register(ClassInfo::instance("HeaderRef", 32, &[8]))
            .is_err());
        assert!(registry
            .register(ClassInfo::instance("Unaligned", 32, &[20]))
            .is_err());
        assert!(registry
            .register(ClassInfo::instance("OutOfBounds", 32, &[32]))
            .is_err());
        assert!(registry
            .register(ClassInfo::primitive_array("odd[]", 3))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn weak_reference_layout() {
        let registry = ClassRegistry::new();
        let weak = ClassInfo::weak_reference("WeakRef", 32, &[24], 16);
        assert!(!weak.is_array());
        assert_eq!(weak.requested_size(0), Some(32));
        assert!(registry.register(weak).is_ok());
        assert!(registry
            .register(ClassInfo::weak_reference("Shared", 32, &[16], 16))
            .is_err());
        assert!(registry
            .register(ClassInfo::weak_reference("Outside", 32, &[], 32))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sizes() {
        let objects = ClassInfo::ref_array("Object[]");
        assert_eq!(objects.requested_size(2), Some(ARRAY_HEADER_BYTES + 16));
        let bytes = ClassInfo::primitive_array("byte[]", 1);
        assert_eq!(bytes.requested_size(5), Some(ARRAY_HEADER_BYTES + 5));
        assert_eq!(bytes.allocated_size(5), Some(32));
        assert_eq!(bytes.allocated_size(usize::MAX), None);
        let small = ClassInfo::instance("Small", 20, &[]);
        assert_eq!(small.allocated_size(0), Some(24));
    }
}
