//! Member resolution and access errors.

use thiserror::Error;

use crate::id::ElementId;
use crate::reflect::NativeError;
use crate::types::TypeName;

/// Errors raised while resolving or accessing a [`MemberData`](super::MemberData).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemberError {
    #[error("member target is not assigned")]
    Unassigned,

    /// The stored target is malformed (e.g. a reflected reference with no items).
    #[error("member '{name}' is inconsistent: {reason}")]
    Inconsistent { name: String, reason: String },

    /// A reflected member could not be found on its declaring type.
    #[error("cannot resolve '{name}' on type '{ty}'")]
    Unresolved { ty: TypeName, name: String },

    /// A graph-native target points at an element that does not exist or
    /// has the wrong kind.
    #[error("element {id} referenced by '{name}' not found")]
    MissingElement { id: ElementId, name: String },

    #[error("'{name}' cannot be read")]
    NotReadable { name: String },

    #[error("'{name}' cannot be written")]
    NotWritable { name: String },

    #[error("'{name}' cannot be invoked")]
    NotInvocable { name: String },

    #[error("'{name}' needs an instance but none was provided")]
    MissingInstance { name: String },

    #[error("'{name}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: TypeName,
        actual: TypeName,
    },

    /// A native member body failed.
    #[error("'{name}' failed: {source}")]
    Native {
        name: String,
        #[source]
        source: NativeError,
    },

    /// The execution context failed while serving the access.
    #[error("{message}")]
    Context { message: String },
}
