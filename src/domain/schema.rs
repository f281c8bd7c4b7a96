//! Document type definitions and the registry that validates them.
//!
//! A [`TypeDef`] is the declaration of a document type: its fields, which of
//! them (if any) is the identity, and whether the type is persisted as an
//! indexed collection. [`Registry::register`] turns a definition into an
//! immutable [`Schema`], merging the fields of the parent type and enforcing
//! that at most one identity field exists.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

/// What a field holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain [`Value`](crate::Value).
    Value,
    /// A [`ReferenceSet`](crate::ReferenceSet) of other documents.
    References {
        /// The document type every element must have.
        ///
        /// When `None`, the type of the first inserted element is used.
        element_type: Option<String>,
    },
}

/// A declared field of a document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    identity: bool,
}

impl FieldDef {
    /// The field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the field holds.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether this field identifies the document.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.identity
    }

    /// Whether this field holds a reference set.
    #[must_use]
    pub const fn is_references(&self) -> bool {
        matches!(self.kind, FieldKind::References { .. })
    }
}

/// The declaration of a document type.
///
/// ```
/// use relief_store::TypeDef;
///
/// let camp = TypeDef::indexed("relief::camp", "Camp")
///     .identity("name")
///     .field("capacity")
///     .references_to("volunteers", "Volunteer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    module: String,
    name: String,
    extends: Option<String>,
    indexed: bool,
    fields: Vec<FieldDef>,
}

impl TypeDef {
    /// Declares an embedded document type.
    ///
    /// Embedded documents have no storage of their own; they are persisted
    /// inside the indexed documents that reference them.
    #[must_use]
    pub fn document(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            extends: None,
            indexed: false,
            fields: Vec::new(),
        }
    }

    /// Declares an indexed document type, persisted as its own collection.
    #[must_use]
    pub fn indexed(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            indexed: true,
            ..Self::document(module, name)
        }
    }

    /// Inherit the fields (and persistence level) of a registered type.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Declare a plain value field.
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push(name.into(), FieldKind::Value, false)
    }

    /// Declare the identity field.
    #[must_use]
    pub fn identity(self, name: impl Into<String>) -> Self {
        self.push(name.into(), FieldKind::Value, true)
    }

    /// Declare a reference set whose element type is fixed by its first
    /// element.
    #[must_use]
    pub fn references(self, name: impl Into<String>) -> Self {
        self.push(
            name.into(),
            FieldKind::References { element_type: None },
            false,
        )
    }

    /// Declare a reference set holding documents of `element_type` only.
    #[must_use]
    pub fn references_to(self, name: impl Into<String>, element_type: impl Into<String>) -> Self {
        self.push(
            name.into(),
            FieldKind::References {
                element_type: Some(element_type.into()),
            },
            false,
        )
    }

    fn push(mut self, name: String, kind: FieldKind, identity: bool) -> Self {
        self.fields.push(FieldDef {
            name,
            kind,
            identity,
        });
        self
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The validated field table of a registered document type.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    module: String,
    name: String,
    indexed: bool,
    fields: Vec<FieldDef>,
    identity: Option<usize>,
    /// Supertypes, nearest first.
    ancestors: Vec<Arc<Schema>>,
}

impl Schema {
    /// The module path the type was declared in.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether documents of this type are persisted as their own collection.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// All fields, inherited ones first.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The position of a field in [`Schema::fields`].
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// The identity field, if one is declared.
    #[must_use]
    pub fn identity_field(&self) -> Option<&FieldDef> {
        self.identity.map(|index| &self.fields[index])
    }

    pub(crate) const fn identity_index(&self) -> Option<usize> {
        self.identity
    }

    /// Supertypes, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Arc<Self>> {
        self.ancestors.iter()
    }

    /// Supertypes that are persisted as collections of their own, nearest
    /// first.
    pub fn indexed_ancestors(&self) -> impl Iterator<Item = &Arc<Self>> {
        self.ancestors.iter().filter(|ancestor| ancestor.indexed)
    }

    /// Whether this type is `name` or inherits from it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.ancestors.iter().any(|ancestor| ancestor.name == name)
    }
}

/// Errors raised while registering a document type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// More than one field, own or inherited, is marked as identity.
    #[error("{type_name} declares more than one identity field ({first} and {second})")]
    MultipleIdentityFields {
        /// The offending type.
        type_name: String,
        /// The identity field found first.
        first: String,
        /// The second identity field.
        second: String,
    },
    /// An indexed type has no identity field to key its collection.
    #[error("indexed type {0} has no identity field")]
    IdentityNotDefined(String),
    /// The parent type has not been registered.
    #[error("{type_name} extends unregistered type {parent}")]
    UnknownParent {
        /// The type being registered.
        type_name: String,
        /// The missing parent.
        parent: String,
    },
    /// A type with this name is already registered.
    #[error("type {0} is already registered")]
    DuplicateType(String),
    /// The name cannot be used as a type (and collection file) name.
    #[error("'{0}' is not a valid type name")]
    InvalidTypeName(String),
}

/// Whether `name` can name a document type.
///
/// Type names double as collection file names, so they are restricted to an
/// ASCII letter followed by ASCII letters, digits or underscores.
#[must_use]
pub fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A document type that maps onto a registered schema.
///
/// Implementors are thin typed handles over a [`DocId`](crate::DocId); the
/// schema itself lives in the [`Registry`].
pub trait Model: Sized {
    /// The registered type name.
    const TYPE: &'static str;

    /// The type declaration.
    fn definition() -> TypeDef;

    /// Wraps a document handle.
    fn from_id(id: crate::DocId) -> Self;

    /// The underlying document handle.
    fn id(&self) -> crate::DocId;
}

/// The set of registered document types.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a type definition and registers its schema.
    ///
    /// Parent types must be registered first. Fields redeclared by the child
    /// replace the inherited field of the same name.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::MultipleIdentityFields`] if the merged field table
    ///   has more than one identity field
    /// - [`SchemaError::IdentityNotDefined`] if an indexed type ends up with
    ///   no identity field
    /// - [`SchemaError::UnknownParent`] or [`SchemaError::DuplicateType`]
    pub fn register(&mut self, definition: TypeDef) -> Result<Arc<Schema>, SchemaError> {
        let TypeDef {
            module,
            name,
            extends,
            indexed,
            fields: own_fields,
        } = definition;

        if !is_valid_type_name(&name) {
            return Err(SchemaError::InvalidTypeName(name));
        }
        if self.schemas.contains_key(&name) {
            return Err(SchemaError::DuplicateType(name));
        }

        let (mut fields, ancestors, parent_indexed) = match extends {
            Some(parent) => {
                let Some(parent) = self.schemas.get(&parent).cloned() else {
                    return Err(SchemaError::UnknownParent {
                        type_name: name,
                        parent,
                    });
                };
                let mut ancestors = vec![parent.clone()];
                ancestors.extend(parent.ancestors.iter().cloned());
                (parent.fields.clone(), ancestors, parent.indexed)
            }
            None => (Vec::new(), Vec::new(), false),
        };

        for field in own_fields {
            match fields.iter_mut().find(|existing| existing.name == field.name) {
                Some(existing) => *existing = field,
                None => fields.push(field),
            }
        }

        let mut identity: Option<usize> = None;
        for (index, field) in fields.iter().enumerate() {
            if !field.identity {
                continue;
            }
            if let Some(first) = identity {
                return Err(SchemaError::MultipleIdentityFields {
                    type_name: name,
                    first: fields[first].name.clone(),
                    second: field.name.clone(),
                });
            }
            identity = Some(index);
        }

        let indexed = indexed || parent_indexed;
        if indexed && identity.is_none() {
            return Err(SchemaError::IdentityNotDefined(name));
        }

        let schema = Arc::new(Schema {
            module,
            name: name.clone(),
            indexed,
            fields,
            identity,
            ancestors,
        });
        tracing::debug!(
            "Registered document type {name} ({} fields)",
            schema.fields.len()
        );
        self.schemas.insert(name, schema.clone());
        Ok(schema)
    }

    /// Registers the schema of a typed [`Model`].
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn register_model<M: Model>(&mut self) -> Result<Arc<Schema>, SchemaError> {
        self.register(M::definition())
    }

    /// Looks up a registered schema by type name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    /// Iterates over every registered schema, in no particular order.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_fields_in_declaration_order() {
        let mut registry = Registry::new();
        let schema = registry
            .register(
                TypeDef::indexed("tests", "Demo")
                    .identity("name")
                    .field("password")
                    .references("children"),
            )
            .unwrap();

        let names: Vec<_> = schema.fields().iter().map(FieldDef::name).collect();
        assert_eq!(names, ["name", "password", "children"]);
        assert_eq!(schema.identity_field().map(FieldDef::name), Some("name"));
        assert!(schema.is_indexed());
    }

    #[test]
    fn rejects_two_identity_fields() {
        let mut registry = Registry::new();
        let error = registry
            .register(TypeDef::indexed("tests", "Demo").identity("id").identity("name"))
            .unwrap_err();

        assert_eq!(
            error,
            SchemaError::MultipleIdentityFields {
                type_name: "Demo".to_string(),
                first: "id".to_string(),
                second: "name".to_string(),
            }
        );
    }

    #[test]
    fn rejects_identity_added_next_to_an_inherited_one() {
        let mut registry = Registry::new();
        registry
            .register(TypeDef::indexed("tests", "User").identity("username"))
            .unwrap();
        let error = registry
            .register(TypeDef::indexed("tests", "Volunteer").extends("User").identity("phone"))
            .unwrap_err();

        assert!(matches!(error, SchemaError::MultipleIdentityFields { .. }));
    }

    #[test]
    fn embedded_documents_may_omit_identity() {
        let mut registry = Registry::new();
        let schema = registry
            .register(TypeDef::document("tests", "Refugee").field("name"))
            .unwrap();

        assert!(schema.identity_field().is_none());
        assert!(!schema.is_indexed());
    }

    #[test]
    fn indexed_documents_require_identity() {
        let mut registry = Registry::new();
        let error = registry
            .register(TypeDef::indexed("tests", "Camp").field("name"))
            .unwrap_err();

        assert_eq!(error, SchemaError::IdentityNotDefined("Camp".to_string()));
    }

    #[test]
    fn subtypes_inherit_fields_and_persistence() {
        let mut registry = Registry::new();
        registry
            .register(TypeDef::indexed("tests", "User").identity("username").field("phone"))
            .unwrap();
        let volunteer = registry
            .register(
                TypeDef::document("tests", "Volunteer")
                    .extends("User")
                    .field("available"),
            )
            .unwrap();

        let names: Vec<_> = volunteer.fields().iter().map(FieldDef::name).collect();
        assert_eq!(names, ["username", "phone", "available"]);
        assert!(volunteer.is_indexed());
        assert!(volunteer.is_a("User"));
        assert_eq!(volunteer.indexed_ancestors().count(), 1);
    }

    #[test]
    fn redeclared_field_overrides_inherited_one() {
        let mut registry = Registry::new();
        registry
            .register(TypeDef::document("tests", "Base").references("items"))
            .unwrap();
        let child = registry
            .register(
                TypeDef::document("tests", "Child")
                    .extends("Base")
                    .references_to("items", "Item"),
            )
            .unwrap();

        assert_eq!(child.fields().len(), 1);
        assert_eq!(
            child.fields()[0].kind(),
            &FieldKind::References {
                element_type: Some("Item".to_string())
            }
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut registry = Registry::new();
        let error = registry
            .register(TypeDef::document("tests", "Orphan").extends("Missing"))
            .unwrap_err();

        assert!(matches!(error, SchemaError::UnknownParent { .. }));
    }

    #[test]
    fn type_names_must_be_usable_as_file_names() {
        let mut registry = Registry::new();
        let error = registry
            .register(TypeDef::document("tests", "../Camp"))
            .unwrap_err();

        assert_eq!(error, SchemaError::InvalidTypeName("../Camp".to_string()));
        assert!(is_valid_type_name("Camp_2"));
        assert!(!is_valid_type_name(""));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut registry = Registry::new();
        registry.register(TypeDef::document("tests", "Once")).unwrap();
        let error = registry
            .register(TypeDef::document("tests", "Once"))
            .unwrap_err();

        assert_eq!(error, SchemaError::DuplicateType("Once".to_string()));
    }
}
