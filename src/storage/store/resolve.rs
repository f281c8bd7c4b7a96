//! Loading identity maps and resolving their references.
//!
//! A collection file is decoded in two passes. The first pass builds a record
//! for every inline document and collects each reference as a pending target.
//! The second pass resolves the targets, loading other collections on demand,
//! and links them into the arena. An identity map is registered as loaded
//! before its file is read, so a collection reached again through a cycle
//! resolves against the documents decoded so far instead of being read twice.

use std::{collections::HashMap, path::Path};

use indexmap::{IndexMap, IndexSet};
use tracing::instrument;

use super::{Index, Store};
use crate::{
    domain::{Arena, DocId, Error, Key, Record, Registry, Result, Slot},
    storage::{
        collection::{ExternalRef, StoredCollection, StoredDocument, StoredField, StoredRef},
        StorageError,
    },
};

/// Where a decoded reference points.
#[derive(Debug)]
enum Target {
    /// A document decoded inline.
    Document(DocId),
    /// A document decoded inline elsewhere in the file.
    Anchor(u64),
    /// A document of the collection's own type.
    Member(Key),
    /// A document of another collection.
    External(ExternalRef),
}

/// A reference waiting to be linked once every target is known.
#[derive(Debug)]
struct Pending {
    owner: DocId,
    field: usize,
    target: Target,
}

/// The outcome of decoding one collection file.
#[derive(Debug, Default)]
struct Decoded {
    entries: Vec<(Key, Target)>,
    pending: Vec<Pending>,
    anchors: HashMap<u64, DocId>,
    roots: IndexSet<ExternalRef>,
}

impl Store {
    /// Loads the identity map of an indexed type unless it is already loaded.
    ///
    /// A missing collection file is an empty collection. Documents of other
    /// collections referenced from this one are loaded as needed, and so are
    /// the collections of the indexed documents that refer to this one.
    ///
    /// If loading fails, every identity map and record created since the call
    /// is discarded, so the next access reads the file again.
    #[instrument(skip(self))]
    pub(super) fn ensure_loaded(&mut self, type_name: &str) -> Result<()> {
        if self.indexes.contains_key(type_name) {
            return Ok(());
        }
        self.indexed_schema(type_name)?;

        let loaded_types = self.indexes.len();
        let journaled = self.journal.len();
        self.indexes.insert(type_name.to_string(), Index::default());
        self.load_depth += 1;
        let result = self.load(type_name);
        self.load_depth -= 1;

        if let Err(e) = &result {
            tracing::debug!("Discarding partial load of {type_name}: {e}");
            self.indexes.truncate(loaded_types);
            let decoded: Vec<DocId> = self.journal.drain(journaled..).collect();
            for id in decoded {
                self.arena.remove(id);
            }
        }
        if self.load_depth == 0 {
            self.journal.clear();
        }
        result
    }

    /// Reads the collection file of `type_name` into its registered, empty
    /// identity map.
    fn load(&mut self, type_name: &str) -> Result<()> {
        let path = self.collection_path(type_name);
        let Some(collection) = StoredCollection::load(&path, self.config.format)? else {
            tracing::debug!("No collection at {}, starting empty", path.display());
            return Ok(());
        };
        if collection.type_name != type_name {
            return Err(StorageError::TypeMismatch {
                path,
                expected: type_name.to_string(),
                found: collection.type_name,
            }
            .into());
        }

        let Decoded {
            entries,
            pending,
            anchors,
            roots,
        } = Decoder::new(&self.registry, &mut self.arena, &mut self.journal, &path)
            .decode(collection)?;

        // Inline entries must be visible before resolving, so that a cycle
        // leading back into this collection finds them.
        let index = self.index_mut(type_name);
        for (key, target) in &entries {
            if let Target::Document(id) = target {
                index.entries.insert(key.clone(), *id);
            }
        }

        for Pending {
            owner,
            field,
            target,
        } in pending
        {
            match self.resolve(type_name, &anchors, &target)? {
                Some(element) => {
                    self.arena.attach(owner, field, element)?;
                }
                None => tracing::warn!(
                    "Dropping dangling reference {target:?} in {}",
                    path.display()
                ),
            }
        }

        let mut rebuilt = IndexMap::with_capacity(entries.len());
        for (key, target) in entries {
            match self.resolve(type_name, &anchors, &target)? {
                Some(id) => {
                    rebuilt.insert(key, id);
                }
                None => tracing::warn!(
                    "Dropping dangling entry {key} in {}",
                    path.display()
                ),
            }
        }
        let count = rebuilt.len();
        self.index_mut(type_name).entries = rebuilt;
        tracing::debug!("Loaded {count} {type_name} entries from {}", path.display());

        let root_types: IndexSet<String> = roots.into_iter().map(|root| root.type_name).collect();
        for root_type in root_types {
            match self.registry.get(&root_type) {
                Some(schema) if schema.is_indexed() => self.ensure_loaded(&root_type)?,
                _ => tracing::warn!("Ignoring root of unknown type {root_type}"),
            }
        }
        Ok(())
    }

    /// The document a pending target stands for, if it still exists.
    fn resolve(
        &mut self,
        type_name: &str,
        anchors: &HashMap<u64, DocId>,
        target: &Target,
    ) -> Result<Option<DocId>> {
        match target {
            Target::Document(id) => Ok(Some(*id)),
            Target::Anchor(anchor) => Ok(anchors.get(anchor).copied()),
            Target::Member(key) => Ok(self.index(type_name)?.entries.get(key).copied()),
            Target::External(token) => {
                match self.registry.get(&token.type_name) {
                    Some(schema) if schema.is_indexed() => {}
                    _ => return Ok(None),
                }
                self.ensure_loaded(&token.type_name)?;
                Ok(self.index(&token.type_name)?.entries.get(&token.key).copied())
            }
        }
    }
}

/// First pass over a collection file: builds records and collects targets.
struct Decoder<'a> {
    registry: &'a Registry,
    arena: &'a mut Arena,
    /// Every record inserted, in order.
    journal: &'a mut Vec<DocId>,
    path: &'a Path,
    decoded: Decoded,
}

impl<'a> Decoder<'a> {
    fn new(
        registry: &'a Registry,
        arena: &'a mut Arena,
        journal: &'a mut Vec<DocId>,
        path: &'a Path,
    ) -> Self {
        Self {
            registry,
            arena,
            journal,
            path,
            decoded: Decoded::default(),
        }
    }

    fn decode(mut self, collection: StoredCollection) -> Result<Decoded> {
        for entry in collection.entries {
            let target = self.target(entry.document)?;
            self.decoded.entries.push((entry.key, target));
        }
        Ok(self.decoded)
    }

    fn target(&mut self, stored: StoredRef) -> Result<Target> {
        Ok(match stored {
            StoredRef::Inline { anchor, document } => {
                Target::Document(self.inline(anchor, document)?)
            }
            StoredRef::Alias { anchor } => Target::Anchor(anchor),
            StoredRef::Member { key } => Target::Member(key),
            StoredRef::External(token) => Target::External(token),
        })
    }

    fn inline(&mut self, anchor: u64, document: StoredDocument) -> Result<DocId> {
        let StoredDocument {
            type_name,
            fields,
            roots,
        } = document;
        let schema = self
            .registry
            .get(&type_name)
            .cloned()
            .ok_or(Error::UnknownType(type_name))?;

        // Registered before the fields are decoded so that aliases nested
        // inside the document can point back at it.
        let id = self.arena.insert(Record::empty(schema.clone()));
        self.journal.push(id);
        if self.decoded.anchors.insert(anchor, id).is_some() {
            return Err(self.corrupt(format!("anchor {anchor} is defined twice")));
        }

        for (name, field) in fields {
            let Some(index) = schema.field_index(&name) else {
                tracing::warn!(
                    "Skipping unknown field {name} of {} in {}",
                    schema.name(),
                    self.path.display()
                );
                continue;
            };
            match field {
                StoredField::Value { value } => {
                    let Some(Slot::Value(slot)) = self.slot_mut(id, index) else {
                        return Err(self.corrupt(format!(
                            "{name} of {} holds a value, expected references",
                            schema.name()
                        )));
                    };
                    *slot = value;
                }
                StoredField::References {
                    element_type,
                    items,
                } => {
                    let Some(Slot::References(set)) = self.slot_mut(id, index) else {
                        return Err(self.corrupt(format!(
                            "{name} of {} holds references, expected a value",
                            schema.name()
                        )));
                    };
                    if set.element_type().is_none() {
                        if let Some(element_type) = element_type {
                            set.set_element_type(element_type);
                        }
                    }
                    for item in items {
                        let target = self.target(item)?;
                        self.decoded.pending.push(Pending {
                            owner: id,
                            field: index,
                            target,
                        });
                    }
                }
            }
        }

        self.decoded.roots.extend(roots);
        Ok(id)
    }

    fn slot_mut(&mut self, id: DocId, index: usize) -> Option<&mut Slot> {
        self.arena
            .get_mut(id)
            .map(|record| record.slot_mut(index))
    }

    fn corrupt(&self, reason: String) -> Error {
        StorageError::Corrupt {
            path: self.path.to_path_buf(),
            reason,
        }
        .into()
    }
}
