use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::domain::{reference_set::ReferenceSet, schema::Schema, value::Value, Key};

/// A handle to a document held by a [`Store`](crate::Store).
///
/// Handles are only meaningful for the store that issued them. After
/// [`Store::reload`](crate::Store::reload) every previously issued handle is
/// stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId(Uuid);

impl DocId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Initial field values passed to [`Store::create`](crate::Store::create).
///
/// ```
/// use relief_store::Fields;
///
/// let fields = Fields::new().with("name", "camp1").with("capacity", 120);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, Init)>,
}

#[derive(Debug, Clone)]
pub(crate) enum Init {
    Value(Value),
    References(Vec<DocId>),
}

impl Fields {
    /// No values; every declared field starts unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a plain value field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), Init::Value(value.into())));
        self
    }

    /// Fills a reference set field with documents, in order.
    #[must_use]
    pub fn with_refs(
        mut self,
        name: impl Into<String>,
        documents: impl IntoIterator<Item = DocId>,
    ) -> Self {
        self.entries.push((
            name.into(),
            Init::References(documents.into_iter().collect()),
        ));
        self
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Init)> {
        self.entries
    }
}

/// The contents of one field of a stored document.
#[derive(Debug, Clone)]
pub enum Slot {
    /// A plain value.
    Value(Value),
    /// A set of references to other documents.
    References(ReferenceSet),
}

/// A document's schema and field contents, as held in the arena.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    slots: Vec<Slot>,
}

impl Record {
    /// Creates a record with every field unset.
    pub(crate) fn empty(schema: Arc<Schema>) -> Self {
        let slots = schema
            .fields()
            .iter()
            .map(|field| match field.kind() {
                crate::domain::FieldKind::Value => Slot::Value(Value::Null),
                crate::domain::FieldKind::References { element_type } => {
                    Slot::References(ReferenceSet::new(element_type.clone()))
                }
            })
            .collect();
        Self { schema, slots }
    }

    /// The document's type.
    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The document's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Field contents, in schema order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// The contents of a field, by name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.schema
            .field_index(name)
            .map(|index| &self.slots[index])
    }

    /// The identity value, if the type has an identity field and it is set.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        let index = self.schema.identity_index()?;
        match &self.slots[index] {
            Slot::Value(value) => Key::from_value(value),
            Slot::References(_) => None,
        }
    }

    /// Reference sets of this document with their field positions.
    pub(crate) fn reference_sets(&self) -> impl Iterator<Item = (usize, &ReferenceSet)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::References(set) => Some((index, set)),
                Slot::Value(_) => None,
            })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.schema.identity_field(), self.key()) {
            (Some(field), Some(key)) => {
                write!(f, "{}({}={key})", self.schema.name(), field.name())
            }
            _ => write!(f, "{}", self.schema.name()),
        }
    }
}
