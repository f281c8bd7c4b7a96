//! Encoding an identity map into its stored form.
//!
//! Documents of the collection's own type are written inline. Embedded
//! documents are written inline the first time they are met and as aliases
//! afterwards, which keeps shared and cyclic embedded structures finite.
//! Documents of any other indexed type become [`ExternalRef`] tokens; they
//! are written by their own collection.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::{
    domain::{Arena, DocId, Error, Key, Result, Schema, Slot},
    storage::collection::{
        ExternalRef, StoredCollection, StoredDocument, StoredEntry, StoredField, StoredRef,
    },
};

/// Encodes the identity map of `schema` held in `arena`.
///
/// # Errors
///
/// Fails if an entry or a referenced document is missing from the arena, or
/// if an indexed document has no identity value.
pub fn encode(
    arena: &Arena,
    schema: &Schema,
    entries: &IndexMap<Key, DocId>,
) -> Result<StoredCollection> {
    let mut encoder = Encoder {
        arena,
        schema,
        anchors: HashMap::new(),
        next_anchor: 0,
    };
    let entries = entries
        .iter()
        .map(|(key, &id)| {
            Ok(StoredEntry {
                key: key.clone(),
                document: encoder.entry(id)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StoredCollection {
        module: schema.module().to_string(),
        type_name: schema.name().to_string(),
        entries,
    })
}

struct Encoder<'a> {
    arena: &'a Arena,
    schema: &'a Schema,
    anchors: HashMap<DocId, u64>,
    next_anchor: u64,
}

impl Encoder<'_> {
    /// A top-level entry: inline if it has the collection's own type, a token
    /// for a subtype persisted in its own collection.
    fn entry(&mut self, id: DocId) -> Result<StoredRef> {
        let record = self.arena.record(id)?;
        if record.type_name() == self.schema.name() {
            self.inline(id)
        } else {
            self.external(id)
        }
    }

    fn reference(&mut self, id: DocId) -> Result<StoredRef> {
        let record = self.arena.record(id)?;
        if !record.schema().is_indexed() {
            return match self.anchors.get(&id) {
                Some(&anchor) => Ok(StoredRef::Alias { anchor }),
                None => self.inline(id),
            };
        }
        if record.type_name() == self.schema.name() {
            let key = record.key().ok_or_else(|| missing_identity(record.type_name()))?;
            return Ok(StoredRef::Member { key });
        }
        self.external(id)
    }

    fn inline(&mut self, id: DocId) -> Result<StoredRef> {
        let anchor = self.next_anchor;
        self.next_anchor += 1;
        self.anchors.insert(id, anchor);
        let document = self.document(id)?;
        Ok(StoredRef::Inline { anchor, document })
    }

    fn external(&self, id: DocId) -> Result<StoredRef> {
        token(self.arena, id).map(StoredRef::External)
    }

    fn document(&mut self, id: DocId) -> Result<StoredDocument> {
        let arena = self.arena;
        let record = arena.record(id)?;
        let mut fields = BTreeMap::new();
        for (field, slot) in record.schema().fields().iter().zip(record.slots()) {
            let stored = match slot {
                Slot::Value(value) => StoredField::Value {
                    value: value.clone(),
                },
                Slot::References(set) => {
                    let items = set
                        .iter()
                        .map(|element| self.reference(element))
                        .collect::<Result<Vec<_>>>()?;
                    StoredField::References {
                        element_type: set.element_type().map(str::to_string),
                        items,
                    }
                }
            };
            fields.insert(field.name().to_string(), stored);
        }

        let roots = arena
            .roots(id)
            .into_iter()
            .map(|root| token(arena, root))
            .collect::<Result<Vec<_>>>()?;

        Ok(StoredDocument {
            type_name: record.type_name().to_string(),
            fields,
            roots,
        })
    }
}

/// The external-reference token for an indexed document.
fn token(arena: &Arena, id: DocId) -> Result<ExternalRef> {
    let record = arena.record(id)?;
    let key = record
        .key()
        .ok_or_else(|| missing_identity(record.type_name()))?;
    Ok(ExternalRef {
        module: record.schema().module().to_string(),
        type_name: record.type_name().to_string(),
        key,
    })
}

fn missing_identity(type_name: &str) -> Error {
    Error::UnindexedType(type_name.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{Record, Registry, TypeDef, Value};

    struct Fixture {
        camp: Arc<Schema>,
        plan: Arc<Schema>,
        refugee: Arc<Schema>,
    }

    fn fixture() -> Fixture {
        let mut registry = Registry::new();
        let refugee = registry
            .register(
                TypeDef::document("tests", "Refugee")
                    .field("name")
                    .references("family"),
            )
            .unwrap();
        let camp = registry
            .register(
                TypeDef::indexed("tests", "Camp")
                    .identity("name")
                    .references("refugees")
                    .references("twins"),
            )
            .unwrap();
        let plan = registry
            .register(
                TypeDef::indexed("tests", "Plan")
                    .identity("name")
                    .references("camps"),
            )
            .unwrap();
        Fixture {
            camp,
            plan,
            refugee,
        }
    }

    fn named(arena: &mut Arena, schema: &Arc<Schema>, name: &str) -> DocId {
        let mut record = Record::empty(schema.clone());
        *record.slot_mut(0) = Slot::Value(Value::from(name));
        arena.insert(record)
    }

    #[test]
    fn other_indexed_types_become_tokens() {
        let fx = fixture();
        let mut arena = Arena::default();
        let camp = named(&mut arena, &fx.camp, "A");
        let plan = named(&mut arena, &fx.plan, "P1");
        arena.attach(plan, 1, camp).unwrap();

        let entries = IndexMap::from([(Key::from("P1"), plan)]);
        let collection = encode(&arena, &fx.plan, &entries).unwrap();

        let StoredRef::Inline { document, .. } = &collection.entries[0].document else {
            panic!("plan should be inline");
        };
        let Some(StoredField::References { items, .. }) = document.fields.get("camps") else {
            panic!("camps should be a reference set");
        };
        assert_eq!(
            items,
            &[StoredRef::External(ExternalRef {
                module: "tests".to_string(),
                type_name: "Camp".to_string(),
                key: Key::from("A"),
            })]
        );
    }

    #[test]
    fn shared_embedded_documents_are_aliased() {
        let fx = fixture();
        let mut arena = Arena::default();
        let camp = named(&mut arena, &fx.camp, "A");
        let refugee = named(&mut arena, &fx.refugee, "R");
        arena.attach(camp, 1, refugee).unwrap();
        arena.attach(camp, 2, refugee).unwrap();

        let entries = IndexMap::from([(Key::from("A"), camp)]);
        let collection = encode(&arena, &fx.camp, &entries).unwrap();

        let StoredRef::Inline { document, .. } = &collection.entries[0].document else {
            panic!("camp should be inline");
        };
        let Some(StoredField::References { items, .. }) = document.fields.get("twins") else {
            panic!("twins should be a reference set");
        };
        assert!(matches!(items[0], StoredRef::Alias { anchor: 1 }));
    }

    #[test]
    fn every_inline_document_gets_its_own_anchor() {
        let fx = fixture();
        let mut arena = Arena::default();
        let a = named(&mut arena, &fx.camp, "A");
        let b = named(&mut arena, &fx.camp, "B");
        for camp in [a, b] {
            for name in ["R1", "R2"] {
                let refugee = named(&mut arena, &fx.refugee, name);
                arena.attach(camp, 1, refugee).unwrap();
            }
        }

        let entries = IndexMap::from([(Key::from("A"), a), (Key::from("B"), b)]);
        let collection = encode(&arena, &fx.camp, &entries).unwrap();

        let mut anchors = Vec::new();
        for entry in &collection.entries {
            let StoredRef::Inline { anchor, document } = &entry.document else {
                panic!("camp should be inline");
            };
            anchors.push(*anchor);
            let Some(StoredField::References { items, .. }) = document.fields.get("refugees") else {
                panic!("refugees should be a reference set");
            };
            for item in items {
                let StoredRef::Inline { anchor, .. } = item else {
                    panic!("refugee should be inline");
                };
                anchors.push(*anchor);
            }
        }
        assert_eq!(anchors, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn embedded_cycles_terminate() {
        let fx = fixture();
        let mut arena = Arena::default();
        let camp = named(&mut arena, &fx.camp, "A");
        let parent = named(&mut arena, &fx.refugee, "parent");
        let child = named(&mut arena, &fx.refugee, "child");
        arena.attach(camp, 1, parent).unwrap();
        arena.attach(parent, 1, child).unwrap();
        arena.attach(child, 1, parent).unwrap();

        let entries = IndexMap::from([(Key::from("A"), camp)]);
        let collection = encode(&arena, &fx.camp, &entries).unwrap();

        assert_eq!(collection.entries.len(), 1);
    }

    #[test]
    fn own_type_references_are_members() {
        let fx = fixture();
        let mut arena = Arena::default();
        let a = named(&mut arena, &fx.plan, "P1");
        let b = named(&mut arena, &fx.plan, "P2");
        arena.attach(a, 1, b).unwrap();

        let entries = IndexMap::from([(Key::from("P1"), a), (Key::from("P2"), b)]);
        let collection = encode(&arena, &fx.plan, &entries).unwrap();

        let StoredRef::Inline { document, .. } = &collection.entries[0].document else {
            panic!("plan should be inline");
        };
        let Some(StoredField::References { items, .. }) = document.fields.get("camps") else {
            panic!("camps should be a reference set");
        };
        assert_eq!(
            items,
            &[StoredRef::Member {
                key: Key::from("P2")
            }]
        );
    }

    #[test]
    fn embedded_documents_record_their_roots() {
        let fx = fixture();
        let mut arena = Arena::default();
        let camp = named(&mut arena, &fx.camp, "A");
        let plan = named(&mut arena, &fx.plan, "P1");
        arena.attach(plan, 1, camp).unwrap();

        let entries = IndexMap::from([(Key::from("A"), camp)]);
        let collection = encode(&arena, &fx.camp, &entries).unwrap();

        let StoredRef::Inline { document, .. } = &collection.entries[0].document else {
            panic!("camp should be inline");
        };
        assert_eq!(document.roots.len(), 1);
        assert_eq!(document.roots[0].type_name, "Plan");
    }
}
