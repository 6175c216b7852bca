//! Stable, structural keys for operator selection.
//!
//! The source corpus this crate's design is distilled from keys operator
//! lookup on reified generic types (`GenericType<T>`) and on runtime class
//! identity. Rust has no reflection, so both roles are played by the same
//! value here: a [`TypeDescriptor`] pairs a `TypeId` fingerprint with a
//! human-readable name for diagnostics. Two descriptors are equal iff their
//! `TypeId`s match; the name is carried for `Debug`/error messages only.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// An opaque, stable identity for a Rust type, used both as an operator's
/// registration qualifier and as the "requested type" key passed to
/// `accept()`.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    /// Build the descriptor for `T`.
    pub fn of<T: 'static>() -> Self {
        TypeDescriptor {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The human-readable type name, for diagnostics only. Not part of
    /// equality.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying `TypeId`, for callers that need to key their own
    /// maps without pulling in this type.
    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDescriptor").field(&self.name).finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
