//! In-memory arena holding every document of a session
//!
//! The [`Arena`] knows nothing about the filesystem or collections. It owns
//! the document records and the reference graph between them, and keeps the
//! two consistent: every element of a reference set has a matching edge from
//! the owner, so the referrers of a document are simply its incoming edges.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::{graphmap::DiGraphMap, Direction};

use crate::domain::{
    document::{Record, Slot},
    error::{Error, Result},
    DocId,
};

/// Data stored on each edge of the reference graph.
///
/// Edges point from the owner to the referenced document. One edge covers
/// every field of the owner that holds the document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    /// Positions of the owner's fields holding the referenced document.
    fields: BTreeSet<usize>,

    /// When the link was first established. Referrers are reported in this
    /// order.
    order: u64,
}

/// Every document record of a session, and the references between them.
#[derive(Debug, Default)]
pub struct Arena {
    /// Document records, keyed by handle.
    records: HashMap<DocId, Record>,

    /// Reference graph. Nodes are handles, edges point from owner to element.
    /// This is the sole source of truth for referrers.
    links: DiGraphMap<DocId, Link>,

    next_order: u64,
}

impl Arena {
    /// Adds a record, returning its new handle.
    pub fn insert(&mut self, record: Record) -> DocId {
        let id = DocId::new();
        self.links.add_node(id);
        self.records.insert(id, record);
        id
    }

    /// Removes a record together with every edge touching it.
    pub fn remove(&mut self, id: DocId) -> Option<Record> {
        for referrer in self.referrers(id) {
            if let Some(record) = self.records.get_mut(&referrer) {
                for slot in record.slots_mut() {
                    if let Slot::References(set) = slot {
                        set.remove(id);
                    }
                }
            }
        }
        self.links.remove_node(id);
        self.records.remove(&id)
    }

    /// The record behind a handle.
    #[must_use]
    pub fn get(&self, id: DocId) -> Option<&Record> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: DocId) -> Option<&mut Record> {
        self.records.get_mut(&id)
    }

    /// The record behind a handle, or [`Error::UnknownDocument`].
    ///
    /// # Errors
    ///
    /// Fails if the handle is not held by this arena.
    pub fn record(&self, id: DocId) -> Result<&Record> {
        self.records.get(&id).ok_or(Error::UnknownDocument(id))
    }

    /// The number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the arena holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops every record and edge.
    pub fn clear(&mut self) {
        self.records.clear();
        self.links.clear();
        self.next_order = 0;
    }

    /// Adds `element` to the reference set in field `field` of `owner`.
    ///
    /// Returns `false` if the element was already present.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDocument`] if either handle is unknown
    /// - [`Error::NotAReferenceField`] if the field holds a plain value
    /// - [`Error::HeterogeneousType`] if the element's type differs from the
    ///   set's element type
    /// - [`Error::DuplicateIdentity`] if a different element with the same
    ///   identity value is present
    pub fn attach(&mut self, owner: DocId, field: usize, element: DocId) -> Result<bool> {
        let element_record = self.record(element)?;
        let element_type = element_record.type_name().to_string();
        let key = element_record.key();

        let owner_record = self
            .records
            .get_mut(&owner)
            .ok_or(Error::UnknownDocument(owner))?;
        let schema = owner_record.schema().clone();
        let Slot::References(set) = owner_record.slot_mut(field) else {
            return Err(Error::NotAReferenceField {
                type_name: schema.name().to_string(),
                field: schema.fields()[field].name().to_string(),
            });
        };

        if set.contains(element) {
            return Ok(false);
        }
        match set.element_type() {
            Some(expected) if expected != element_type => {
                return Err(Error::HeterogeneousType {
                    expected: expected.to_string(),
                    found: element_type,
                });
            }
            Some(_) => {}
            None => set.set_element_type(element_type.clone()),
        }
        if let Some(key) = &key {
            if set.by_key(key).is_some() {
                return Err(Error::DuplicateIdentity {
                    type_name: element_type,
                    key: key.clone(),
                });
            }
        }
        set.push(element, key);

        if let Some(link) = self.links.edge_weight_mut(owner, element) {
            link.fields.insert(field);
        } else {
            let order = self.next_order;
            self.next_order += 1;
            self.links.add_edge(
                owner,
                element,
                Link {
                    fields: BTreeSet::from([field]),
                    order,
                },
            );
        }
        Ok(true)
    }

    /// Removes `element` from the reference set in field `field` of `owner`.
    ///
    /// Returns `false` if it was not present.
    pub fn detach(&mut self, owner: DocId, field: usize, element: DocId) -> bool {
        let Some(Slot::References(set)) = self
            .records
            .get_mut(&owner)
            .map(|record| record.slot_mut(field))
        else {
            return false;
        };
        if !set.remove(element) {
            return false;
        }
        self.unlink_field(owner, field, element);
        true
    }

    /// Empties the reference set in field `field` of `owner`, returning the
    /// former elements in order.
    pub fn detach_all(&mut self, owner: DocId, field: usize) -> Vec<DocId> {
        let Some(Slot::References(set)) = self
            .records
            .get_mut(&owner)
            .map(|record| record.slot_mut(field))
        else {
            return Vec::new();
        };
        let elements = set.take_elements();
        for &element in &elements {
            self.unlink_field(owner, field, element);
        }
        elements
    }

    fn unlink_field(&mut self, owner: DocId, field: usize, element: DocId) {
        let now_unlinked = self.links.edge_weight_mut(owner, element).is_some_and(|link| {
            link.fields.remove(&field);
            link.fields.is_empty()
        });
        if now_unlinked {
            self.links.remove_edge(owner, element);
        }
    }

    /// Documents holding a reference to `id`, in the order the references
    /// were first made.
    #[must_use]
    pub fn referrers(&self, id: DocId) -> Vec<DocId> {
        if !self.links.contains_node(id) {
            return Vec::new();
        }
        let mut referrers: Vec<(u64, DocId)> = self
            .links
            .neighbors_directed(id, Direction::Incoming)
            .filter_map(|referrer| {
                self.links
                    .edge_weight(referrer, id)
                    .map(|link| (link.order, referrer))
            })
            .collect();
        referrers.sort_unstable();
        referrers.into_iter().map(|(_, referrer)| referrer).collect()
    }

    /// Positions of the fields of `owner` that hold `element`.
    #[must_use]
    pub fn linking_fields(&self, owner: DocId, element: DocId) -> Vec<usize> {
        self.links
            .edge_weight(owner, element)
            .map(|link| link.fields.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Documents referenced by `id`, in field order then insertion order.
    #[must_use]
    pub fn references(&self, id: DocId) -> Vec<DocId> {
        let Some(record) = self.records.get(&id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        record
            .reference_sets()
            .flat_map(|(_, set)| set.iter())
            .filter(|element| seen.insert(*element))
            .collect()
    }

    /// The nearest indexed documents found by walking up the referrers of
    /// `id`.
    ///
    /// Walking stops at the first indexed document on each path. A chain of
    /// embedded referrers that never reaches an indexed document contributes
    /// nothing.
    #[must_use]
    pub fn roots(&self, id: DocId) -> Vec<DocId> {
        let mut seen = HashSet::from([id]);
        let mut pending = self.referrers(id);
        pending.reverse();
        let mut roots = Vec::new();
        while let Some(referrer) = pending.pop() {
            if !seen.insert(referrer) {
                continue;
            }
            let Some(record) = self.records.get(&referrer) else {
                continue;
            };
            if record.schema().is_indexed() {
                roots.push(referrer);
                continue;
            }
            let above = self.referrers(referrer);
            if above.is_empty() {
                tracing::debug!("{record} has no indexed referrer; it is not reloaded with {id}");
            }
            pending.extend(above.into_iter().rev());
        }
        roots
    }

    /// Every document connected to `start` through references in either
    /// direction, `start` first.
    #[must_use]
    pub fn component(&self, start: DocId) -> Vec<DocId> {
        let mut seen = HashSet::from([start]);
        let mut order = vec![start];
        let mut cursor = 0;
        while let Some(&id) = order.get(cursor) {
            cursor += 1;
            for next in self.referrers(id).into_iter().chain(self.references(id)) {
                if seen.insert(next) {
                    order.push(next);
                }
            }
        }
        order
    }
}
