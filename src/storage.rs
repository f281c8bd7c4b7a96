//! Filesystem persistence of identity maps.
//!
//! The [`Store`] is the entry point: it owns the documents of a session and
//! loads and rewrites one collection file per indexed type.

mod codec;
pub mod collection;
mod path;
mod store;

pub use collection::{
    ExternalRef, StorageError, StoredCollection, StoredDocument, StoredEntry, StoredField,
    StoredRef,
};
pub use path::{collection_files, collection_path, parse_collection_path, ParseError};
pub use store::Store;
