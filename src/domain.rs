//! Domain models for the document store.
//!
//! This module contains the filesystem-agnostic types: document type schemas,
//! field values, reference sets, and the arena holding a session's documents.

/// In-memory arena of documents and the reference graph between them.
pub mod arena;
pub use arena::Arena;

mod config;
pub use config::{Config, ConfigError, Format};

/// Document handles, records and initial field values.
pub mod document;
pub use document::{DocId, Fields, Record, Slot};

mod error;
pub use error::{Error, Result};

mod reference_set;
pub use reference_set::ReferenceSet;

pub mod schema;
pub use schema::{FieldDef, FieldKind, Model, Registry, Schema, SchemaError, TypeDef};

mod value;
pub use value::{Key, Value};
