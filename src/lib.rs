//! Embedded document store with two-way references
//!
//! Documents are records of named fields described by a registered
//! [`Schema`]. Fields hold plain [`Value`]s or ordered [`ReferenceSet`]s of
//! other documents, and every reference is mirrored by a back-link, so the
//! referrers of any document are always known. Indexed document types are
//! persisted as one collection file per type; links that cross from one
//! collection into another are stored as tokens and resolved on load.
//!
//! The [`relief`] module builds the models of an emergency-relief
//! application on top of the store.

pub mod domain;
pub use domain::{
    Config, ConfigError, DocId, Error, FieldDef, FieldKind, Fields, Format, Key, Model, Record,
    ReferenceSet, Registry, Result, Schema, SchemaError, Slot, TypeDef, Value,
};

pub mod relief;

/// Filesystem storage of identity maps.
pub mod storage;
pub use storage::{StorageError, Store};
