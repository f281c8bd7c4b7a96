//! A filesystem backed store of documents
//!
//! The [`Store`] owns every document of a session. Documents live in an
//! [`Arena`] and are addressed by [`DocId`] handles. Each indexed type has an
//! identity map that is loaded from its collection file the first time the
//! type is touched, and rewritten in full whenever a document reachable from
//! it changes.

use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::{IndexMap, IndexSet};

use crate::{
    domain::{
        document::Init, Arena, Config, DocId, Error, Fields, Key, Record, ReferenceSet, Registry,
        Result, Schema, Slot, Value,
    },
    storage::{codec, collection_path, StorageError},
};

mod resolve;

/// The identity map of one indexed type, in insertion order.
#[derive(Debug, Default)]
struct Index {
    entries: IndexMap<Key, DocId>,
}

/// A filesystem backed store of documents.
#[derive(Debug)]
pub struct Store {
    /// The directory holding `config.toml` and the data directory.
    root: PathBuf,
    config: Config,
    registry: Registry,
    arena: Arena,
    /// Identity maps of the indexed types loaded so far.
    indexes: IndexMap<String, Index>,
    /// Records decoded by the load in progress, removed again if it fails.
    journal: Vec<DocId>,
    /// Nesting depth of collection loads.
    load_depth: usize,
}

impl Store {
    /// Opens a store rooted at `root`, reading `config.toml` if present.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>, registry: Registry) -> Self {
        let root = root.into();
        let config = load_config(&root);
        Self::with_config(root, config, registry)
    }

    /// Opens a store rooted at `root` with an explicit configuration.
    #[must_use]
    pub fn with_config(root: impl Into<PathBuf>, config: Config, registry: Registry) -> Self {
        Self {
            root: root.into(),
            config,
            registry,
            arena: Arena::default(),
            indexes: IndexMap::new(),
            journal: Vec::new(),
            load_depth: 0,
        }
    }

    /// The root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The store's configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The registered document types.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The directory holding the collection files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(self.config.data_dir())
    }

    /// The collection file of an indexed type.
    #[must_use]
    pub fn collection_path(&self, type_name: &str) -> PathBuf {
        collection_path(&self.data_dir(), type_name, self.config.format)
    }

    /// Number of documents held in memory, embedded documents included.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.arena.len()
    }

    /// Discards every document held in memory.
    ///
    /// Identity maps are read again from storage on next access. Handles
    /// issued before the reload are no longer valid.
    pub fn reload(&mut self) {
        tracing::debug!(
            "Discarding {} documents and {} identity maps",
            self.arena.len(),
            self.indexes.len()
        );
        self.arena.clear();
        self.indexes.clear();
    }

    /// Creates a document of type `type_name`.
    ///
    /// Indexed documents are inserted into the identity map of their type and
    /// of every indexed supertype. The new document is saved, along with every
    /// document it references.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownType`] or [`Error::UnknownField`] for names the
    ///   registry does not know
    /// - [`Error::NotAValueField`] or [`Error::NotAReferenceField`] if a value
    ///   is given for a reference set or the other way round
    /// - [`Error::IdentityNotSet`] if the type has an identity field that was
    ///   not given a value
    /// - [`Error::InvalidIdentity`] if the identity value is not an integer or
    ///   text
    /// - [`Error::DuplicateIdentity`] if an indexed document with the same
    ///   identity already exists
    /// - any error raised while adding the initial references, or while
    ///   writing storage
    pub fn create(&mut self, type_name: &str, fields: Fields) -> Result<DocId> {
        let schema = self.schema(type_name)?;
        let mut record = Record::empty(schema.clone());
        let mut references = Vec::new();

        for (name, init) in fields.into_entries() {
            let Some(index) = schema.field_index(&name) else {
                return Err(Error::UnknownField {
                    type_name: type_name.to_string(),
                    field: name,
                });
            };
            match (init, record.slot_mut(index)) {
                (Init::Value(value), Slot::Value(slot)) => *slot = value,
                (Init::References(documents), Slot::References(_)) => {
                    references.push((index, documents));
                }
                (Init::Value(_), Slot::References(_)) => {
                    return Err(Error::NotAValueField {
                        type_name: type_name.to_string(),
                        field: name,
                    });
                }
                (Init::References(_), Slot::Value(_)) => {
                    return Err(Error::NotAReferenceField {
                        type_name: type_name.to_string(),
                        field: name,
                    });
                }
            }
        }

        let key = check_identity(&record)?;
        if let Some(key) = &key {
            for level in persisted_levels(&schema) {
                self.ensure_loaded(&level)?;
                if self.index(&level)?.entries.contains_key(key) {
                    return Err(Error::DuplicateIdentity {
                        type_name: level,
                        key: key.clone(),
                    });
                }
            }
        }

        let id = self.arena.insert(record);
        for (field, documents) in references {
            for document in documents {
                if let Err(e) = self.arena.attach(id, field, document) {
                    self.arena.remove(id);
                    return Err(e);
                }
            }
        }

        if let Some(key) = key {
            for level in persisted_levels(&schema) {
                self.index_mut(&level).entries.insert(key.clone(), id);
            }
        }

        tracing::info!("Created {}", self.arena.record(id)?);
        self.flush_from(id)?;
        Ok(id)
    }

    /// Saves a document.
    ///
    /// An indexed document is put back into the identity maps of its type and
    /// indexed supertypes. Every identity map reachable from the document,
    /// through references in either direction, is then rewritten.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIdentity`] if a different document holds
    /// the same identity, or if storage cannot be written.
    pub fn save(&mut self, id: DocId) -> Result<()> {
        let record = self.arena.record(id)?;
        let schema = record.schema().clone();
        if let Some(key) = record.key().filter(|_| schema.is_indexed()) {
            for level in persisted_levels(&schema) {
                self.ensure_loaded(&level)?;
                let entries = &mut self.index_mut(&level).entries;
                match entries.get(&key) {
                    Some(&other) if other != id => {
                        return Err(Error::DuplicateIdentity {
                            type_name: level,
                            key,
                        });
                    }
                    Some(_) => {}
                    None => {
                        entries.insert(key.clone(), id);
                    }
                }
            }
        }
        self.flush_from(id)
    }

    /// Deletes a document.
    ///
    /// An indexed document is removed from the identity maps of its type and
    /// indexed supertypes. The document is then removed from every reference
    /// set holding it, and each former referrer is saved. The document keeps
    /// its own references.
    ///
    /// # Errors
    ///
    /// Fails if the handle is unknown or storage cannot be written.
    pub fn delete(&mut self, id: DocId) -> Result<()> {
        let record = self.arena.record(id)?;
        let schema = record.schema().clone();
        let key = record.key();
        let label = record.to_string();

        if let Some(key) = key.filter(|_| schema.is_indexed()) {
            for level in persisted_levels(&schema) {
                self.unindex(&level, &key, id)?;
            }
        }
        self.unlink_referrers(id)?;
        tracing::info!("Deleted {label}");
        Ok(())
    }

    /// Deletes every document of an indexed type, then removes its
    /// collection file.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotIndexed`] for embedded types, or if storage
    /// cannot be written or the file cannot be removed.
    pub fn delete_all(&mut self, type_name: &str) -> Result<()> {
        self.indexed_schema(type_name)?;
        self.ensure_loaded(type_name)?;
        let members: Vec<(Key, DocId)> = self
            .index(type_name)?
            .entries
            .iter()
            .map(|(key, &id)| (key.clone(), id))
            .collect();

        for (key, id) in &members {
            let schema = self.arena.record(*id)?.schema().clone();
            let mut levels = persisted_levels(&schema);
            levels.retain(|level| level != type_name);
            for level in levels {
                self.unindex(&level, key, *id)?;
            }
            self.unlink_referrers(*id)?;
        }

        let path = self.collection_path(type_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(StorageError::Io { path, source }.into()),
        }
        self.index_mut(type_name).entries.clear();
        tracing::info!("Deleted all {} {type_name} documents", members.len());
        Ok(())
    }

    /// Looks up an indexed document by identity.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotIndexed`] for embedded types, or if the
    /// collection cannot be read.
    pub fn find(&mut self, type_name: &str, key: impl Into<Key>) -> Result<Option<DocId>> {
        self.indexed_schema(type_name)?;
        self.ensure_loaded(type_name)?;
        Ok(self.index(type_name)?.entries.get(&key.into()).copied())
    }

    /// Every document in the identity map of an indexed type, in insertion
    /// order. Documents of indexed subtypes are included.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotIndexed`] for embedded types, or if the
    /// collection cannot be read.
    pub fn all(&mut self, type_name: &str) -> Result<Vec<DocId>> {
        self.indexed_schema(type_name)?;
        self.ensure_loaded(type_name)?;
        Ok(self.index(type_name)?.entries.values().copied().collect())
    }

    /// Changes a plain value field and saves the document.
    ///
    /// # Errors
    ///
    /// - [`Error::IdentityImmutable`] for the identity field
    /// - [`Error::NotAValueField`] for reference sets
    /// - [`Error::UnknownField`] or [`Error::UnknownDocument`]
    pub fn set(&mut self, id: DocId, field: &str, value: impl Into<Value>) -> Result<()> {
        let record = self.arena.get_mut(id).ok_or(Error::UnknownDocument(id))?;
        let schema = record.schema().clone();
        let index = field_index(&schema, field)?;
        if schema.fields()[index].is_identity() {
            return Err(Error::IdentityImmutable {
                type_name: schema.name().to_string(),
                field: field.to_string(),
            });
        }
        match record.slot_mut(index) {
            Slot::Value(slot) => *slot = value.into(),
            Slot::References(_) => {
                return Err(Error::NotAValueField {
                    type_name: schema.name().to_string(),
                    field: field.to_string(),
                });
            }
        }
        self.flush_from(id)
    }

    /// Appends documents to a reference set, in order, then saves the owner.
    ///
    /// Documents already in the set are skipped. If one document is rejected
    /// the ones before it stay added.
    ///
    /// # Errors
    ///
    /// - [`Error::HeterogeneousType`] if a document's type differs from the
    ///   set's element type
    /// - [`Error::DuplicateIdentity`] if a different element with the same
    ///   identity is present
    pub fn add(&mut self, owner: DocId, field: &str, documents: &[DocId]) -> Result<()> {
        let index = self.reference_field(owner, field)?;
        let mut outcome = Ok(());
        for &document in documents {
            if let Err(e) = self.arena.attach(owner, index, document) {
                outcome = Err(e);
                break;
            }
        }
        self.flush_from(owner)?;
        outcome
    }

    /// Removes a document from a reference set, then saves it and the owner.
    ///
    /// If the handle itself is not an element, the first element equal to it
    /// is removed instead.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if no element matches.
    pub fn remove(&mut self, owner: DocId, field: &str, document: DocId) -> Result<()> {
        let index = self.reference_field(owner, field)?;
        let set = self.reference_set(owner, index)?;
        let target = if set.contains(document) {
            document
        } else {
            set.iter()
                .find(|&element| self.equals(element, document))
                .ok_or(Error::NotFound)?
        };
        self.arena.detach(owner, index, target);
        self.flush_from(target)?;
        self.flush_from(owner)
    }

    /// Removes the element with the given identity from a reference set.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if no element has that identity, or
    /// [`Error::UnindexedType`] if the element type has no identity field.
    pub fn remove_key(&mut self, owner: DocId, field: &str, key: impl Into<Key>) -> Result<()> {
        let element = self.get(owner, field, key)?.ok_or(Error::NotFound)?;
        self.remove(owner, field, element)
    }

    /// Replaces the whole content of a reference set.
    ///
    /// Former elements lose the owner as a referrer and are saved. The new
    /// elements are added in order, then the owner is saved.
    ///
    /// # Errors
    ///
    /// Same as [`Store::add`].
    pub fn set_references(&mut self, owner: DocId, field: &str, documents: &[DocId]) -> Result<()> {
        let index = self.reference_field(owner, field)?;
        let former = self.arena.detach_all(owner, index);
        let mut outcome = Ok(());
        for &document in documents {
            if let Err(e) = self.arena.attach(owner, index, document) {
                outcome = Err(e);
                break;
            }
        }
        for element in former {
            if !documents.contains(&element) {
                self.flush_from(element)?;
            }
        }
        self.flush_from(owner)?;
        outcome
    }

    /// Looks up an element of a reference set by identity.
    ///
    /// Returns `Ok(None)` while the set is empty and has no element type.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnindexedType`] if the element type has no
    /// identity field.
    pub fn get(&self, owner: DocId, field: &str, key: impl Into<Key>) -> Result<Option<DocId>> {
        let set = self.references(owner, field)?;
        let Some(element_type) = set.element_type() else {
            return Ok(None);
        };
        if self.schema(element_type)?.identity_field().is_none() {
            return Err(Error::UnindexedType(element_type.to_string()));
        }
        Ok(set.by_key(&key.into()))
    }

    /// Whether a document is an element of a reference set.
    ///
    /// # Errors
    ///
    /// Fails if the owner or field is unknown.
    pub fn contains(&self, owner: DocId, field: &str, document: DocId) -> Result<bool> {
        Ok(self.references(owner, field)?.contains(document))
    }

    /// Whether a reference set holds an element with the given identity.
    ///
    /// # Errors
    ///
    /// Same as [`Store::get`].
    pub fn contains_key(&self, owner: DocId, field: &str, key: impl Into<Key>) -> Result<bool> {
        Ok(self.get(owner, field, key)?.is_some())
    }

    /// Documents currently referencing `id`, in the order the references were
    /// made.
    ///
    /// # Errors
    ///
    /// Fails if the handle is unknown.
    pub fn referred_by(&self, id: DocId) -> Result<Vec<DocId>> {
        self.arena.record(id)?;
        Ok(self.arena.referrers(id))
    }

    /// The first referrer of `id` matching an optional type and field name.
    ///
    /// The type filter also matches subtypes.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ReferrerNotFound`] if no referrer matches.
    pub fn find_referred_by(
        &self,
        id: DocId,
        type_name: Option<&str>,
        field: Option<&str>,
    ) -> Result<DocId> {
        self.arena.record(id)?;
        self.arena
            .referrers(id)
            .into_iter()
            .find(|&referrer| {
                let Some(record) = self.arena.get(referrer) else {
                    return false;
                };
                let schema = record.schema();
                type_name.is_none_or(|name| schema.is_a(name))
                    && field.is_none_or(|name| {
                        self.arena
                            .linking_fields(referrer, id)
                            .into_iter()
                            .any(|index| schema.fields()[index].name() == name)
                    })
            })
            .ok_or(Error::ReferrerNotFound(id))
    }

    /// Structural equality over field contents.
    ///
    /// Referrers are not compared. Indexed documents of different types are
    /// never equal. Reference sets compare element by element, and cycles are
    /// treated as equal once entered.
    #[must_use]
    pub fn equals(&self, a: DocId, b: DocId) -> bool {
        self.equal_within(a, b, &mut HashSet::new())
    }

    fn equal_within(&self, a: DocId, b: DocId, seen: &mut HashSet<(DocId, DocId)>) -> bool {
        if a == b || !seen.insert((a, b)) {
            return true;
        }
        let (Some(left), Some(right)) = (self.arena.get(a), self.arena.get(b)) else {
            return false;
        };
        let (left_schema, right_schema) = (left.schema(), right.schema());
        if left_schema.is_indexed()
            && right_schema.is_indexed()
            && left_schema.name() != right_schema.name()
        {
            return false;
        }
        if left_schema.fields().len() != right_schema.fields().len() {
            return false;
        }
        left_schema
            .fields()
            .iter()
            .zip(left.slots())
            .all(|(field, slot)| match (slot, right.slot(field.name())) {
                (Slot::Value(x), Some(Slot::Value(y))) => x == y,
                (Slot::References(x), Some(Slot::References(y))) => {
                    x.len() == y.len()
                        && x.iter()
                            .zip(y.iter())
                            .all(|(x, y)| self.equal_within(x, y, seen))
                }
                _ => false,
            })
    }

    /// The record behind a handle.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownDocument`] if the handle is not held here.
    pub fn record(&self, id: DocId) -> Result<&Record> {
        self.arena.record(id)
    }

    /// A plain value field of a document.
    ///
    /// # Errors
    ///
    /// Fails for unknown documents and fields, or with
    /// [`Error::NotAValueField`] for reference sets.
    pub fn value(&self, id: DocId, field: &str) -> Result<&Value> {
        let record = self.arena.record(id)?;
        let index = field_index(record.schema(), field)?;
        match &record.slots()[index] {
            Slot::Value(value) => Ok(value),
            Slot::References(_) => Err(Error::NotAValueField {
                type_name: record.type_name().to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// The identity value of a document, if its type has one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownDocument`] if the handle is not held here.
    pub fn key(&self, id: DocId) -> Result<Option<Key>> {
        Ok(self.arena.record(id)?.key())
    }

    /// A reference set field of a document.
    ///
    /// # Errors
    ///
    /// Fails for unknown documents and fields, or with
    /// [`Error::NotAReferenceField`] for plain values.
    pub fn references(&self, id: DocId, field: &str) -> Result<&ReferenceSet> {
        let record = self.arena.record(id)?;
        let index = field_index(record.schema(), field)?;
        self.reference_set(id, index)
    }

    fn reference_set(&self, id: DocId, index: usize) -> Result<&ReferenceSet> {
        let record = self.arena.record(id)?;
        match &record.slots()[index] {
            Slot::References(set) => Ok(set),
            Slot::Value(_) => Err(Error::NotAReferenceField {
                type_name: record.type_name().to_string(),
                field: record.schema().fields()[index].name().to_string(),
            }),
        }
    }

    fn reference_field(&self, owner: DocId, field: &str) -> Result<usize> {
        let record = self.arena.record(owner)?;
        let index = field_index(record.schema(), field)?;
        self.reference_set(owner, index)?;
        Ok(index)
    }

    fn schema(&self, type_name: &str) -> Result<Arc<Schema>> {
        self.registry
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    fn indexed_schema(&self, type_name: &str) -> Result<Arc<Schema>> {
        let schema = self.schema(type_name)?;
        if schema.is_indexed() {
            Ok(schema)
        } else {
            Err(Error::NotIndexed(type_name.to_string()))
        }
    }

    /// The identity map of a loaded type.
    fn index(&self, type_name: &str) -> Result<&Index> {
        self.indexes
            .get(type_name)
            .ok_or_else(|| Error::NotIndexed(type_name.to_string()))
    }

    fn index_mut(&mut self, type_name: &str) -> &mut Index {
        self.indexes.entry(type_name.to_string()).or_default()
    }

    /// Removes `id` from the identity map of `type_name` if it is the entry
    /// for `key`, and rewrites that map.
    fn unindex(&mut self, type_name: &str, key: &Key, id: DocId) -> Result<()> {
        self.ensure_loaded(type_name)?;
        let entries = &mut self.index_mut(type_name).entries;
        if entries.get(key) == Some(&id) {
            entries.shift_remove(key);
        }
        self.write_index(type_name)
    }

    /// Removes `id` from the reference sets of all its referrers, saving each.
    fn unlink_referrers(&mut self, id: DocId) -> Result<()> {
        for referrer in self.arena.referrers(id) {
            for field in self.arena.linking_fields(referrer, id) {
                self.arena.detach(referrer, field, id);
            }
            self.flush_from(referrer)?;
        }
        Ok(())
    }

    /// Rewrites every identity map holding a document connected to `id`.
    ///
    /// Embedded documents have no storage of their own; they are written as
    /// part of whichever indexed documents reach them.
    fn flush_from(&mut self, id: DocId) -> Result<()> {
        let mut types = IndexSet::new();
        for document in self.arena.component(id) {
            let Some(record) = self.arena.get(document) else {
                continue;
            };
            for level in persisted_levels(record.schema()) {
                types.insert(level);
            }
        }
        for type_name in types {
            self.write_index(&type_name)?;
        }
        Ok(())
    }

    /// Rewrites the whole collection file of an indexed type.
    fn write_index(&mut self, type_name: &str) -> Result<()> {
        self.ensure_loaded(type_name)?;
        let schema = self.indexed_schema(type_name)?;
        let collection = codec::encode(&self.arena, &schema, &self.index(type_name)?.entries)?;
        let path = self.collection_path(type_name);
        collection.save(&path, self.config.format)?;
        tracing::debug!(
            "Wrote {} {type_name} entries to {}",
            collection.entries.len(),
            path.display()
        );
        Ok(())
    }
}

/// The indexed type of a schema followed by its indexed supertypes.
fn persisted_levels(schema: &Schema) -> Vec<String> {
    let own = schema.is_indexed().then(|| schema.name().to_string());
    own.into_iter()
        .chain(
            schema
                .indexed_ancestors()
                .map(|ancestor| ancestor.name().to_string()),
        )
        .collect()
}

fn field_index(schema: &Schema, field: &str) -> Result<usize> {
    schema.field_index(field).ok_or_else(|| Error::UnknownField {
        type_name: schema.name().to_string(),
        field: field.to_string(),
    })
}

/// Validates the identity value of a freshly built record.
fn check_identity(record: &Record) -> Result<Option<Key>> {
    let schema = record.schema();
    let Some(field) = schema.identity_field() else {
        return Ok(None);
    };
    let error_fields = || (schema.name().to_string(), field.name().to_string());
    match record.slot(field.name()) {
        Some(Slot::Value(value)) if value.is_null() => {
            let (type_name, field) = error_fields();
            Err(Error::IdentityNotSet { type_name, field })
        }
        _ => record.key().map(Some).ok_or_else(|| {
            let (type_name, field) = error_fields();
            Error::InvalidIdentity { type_name, field }
        }),
    }
}

fn load_config(root: &Path) -> Config {
    let path = root.join("config.toml");
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}
