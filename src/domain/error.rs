use thiserror::Error;

use crate::{
    domain::{DocId, Key},
    storage::StorageError,
};

/// Errors raised by document operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No type with this name is registered.
    #[error("unknown document type {0}")]
    UnknownType(String),

    /// The type has no field with this name.
    #[error("{type_name} has no field named {field}")]
    UnknownField {
        /// The document type.
        type_name: String,
        /// The requested field.
        field: String,
    },

    /// The identity field was not given a value at construction.
    #[error("identity field {field} of {type_name} is not set")]
    IdentityNotSet {
        /// The document type.
        type_name: String,
        /// The identity field.
        field: String,
    },

    /// The identity field cannot change once the document exists.
    #[error("identity field {field} of {type_name} cannot be changed after construction")]
    IdentityImmutable {
        /// The document type.
        type_name: String,
        /// The identity field.
        field: String,
    },

    /// The identity value is neither an integer nor text.
    #[error("identity field {field} of {type_name} must hold an integer or text")]
    InvalidIdentity {
        /// The document type.
        type_name: String,
        /// The identity field.
        field: String,
    },

    /// A plain value was expected, but the field holds references.
    #[error("{field} of {type_name} is a reference set, not a value")]
    NotAValueField {
        /// The document type.
        type_name: String,
        /// The field.
        field: String,
    },

    /// A reference set was expected, but the field holds a plain value.
    #[error("{field} of {type_name} is a value, not a reference set")]
    NotAReferenceField {
        /// The document type.
        type_name: String,
        /// The field.
        field: String,
    },

    /// The document's type differs from the reference set's element type.
    #[error("reference set holds {expected} documents, cannot add a {found}")]
    HeterogeneousType {
        /// The established element type.
        expected: String,
        /// The type of the rejected document.
        found: String,
    },

    /// Another document with the same identity value is already present.
    #[error("a {type_name} with identity {key} already exists")]
    DuplicateIdentity {
        /// The document type.
        type_name: String,
        /// The clashing identity value.
        key: Key,
    },

    /// The document is not an element of the reference set.
    #[error("document is not in the reference set")]
    NotFound,

    /// Lookup by identity on a type without an identity field.
    #[error("{0} has no identity field")]
    UnindexedType(String),

    /// The type is not persisted as a collection of its own.
    #[error("{0} is not an indexed document type")]
    NotIndexed(String),

    /// No referrer matched the requested type and field.
    #[error("no referrer of {0} matches")]
    ReferrerNotFound(DocId),

    /// The handle does not belong to a document held by this store.
    #[error("document {0} is not held by this store")]
    UnknownDocument(DocId),

    /// Reading or writing a collection failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for document operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
