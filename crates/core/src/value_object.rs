//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are replaced wholesale rather than
/// mutated field by field. `Money` and a document's verification state are
/// the two in this workspace: swapping the whole value is what keeps a
/// verification's flag, verifier and timestamp consistent with each other.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
