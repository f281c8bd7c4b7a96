use std::collections::HashMap;

use crate::domain::{DocId, Key};

/// An ordered, type-homogeneous set of references held by one field of one
/// document.
///
/// Iteration yields elements in insertion order. Elements whose type has an
/// identity field are also indexed by their identity value for constant-time
/// lookup.
///
/// A reference set is read-only from the outside; mutations go through the
/// [`Store`](crate::Store) so that the owner is registered as a referrer of
/// every element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    element_type: Option<String>,
    elements: Vec<DocId>,
    by_key: HashMap<Key, DocId>,
}

impl ReferenceSet {
    pub(crate) fn new(element_type: Option<String>) -> Self {
        Self {
            element_type,
            elements: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    /// The type every element has, once established.
    #[must_use]
    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_deref()
    }

    /// The elements, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.elements.iter().copied()
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether `document` is an element.
    #[must_use]
    pub fn contains(&self, document: DocId) -> bool {
        self.elements.contains(&document)
    }

    /// The element with the given identity value.
    #[must_use]
    pub fn by_key(&self, key: &Key) -> Option<DocId> {
        self.by_key.get(key).copied()
    }

    pub(crate) fn set_element_type(&mut self, element_type: String) {
        self.element_type = Some(element_type);
    }

    pub(crate) fn push(&mut self, document: DocId, key: Option<Key>) {
        self.elements.push(document);
        if let Some(key) = key {
            self.by_key.insert(key, document);
        }
    }

    /// Removes `document`, returning whether it was present.
    pub(crate) fn remove(&mut self, document: DocId) -> bool {
        let Some(position) = self.elements.iter().position(|&id| id == document) else {
            return false;
        };
        self.elements.remove(position);
        self.by_key.retain(|_, id| *id != document);
        true
    }

    pub(crate) fn take_elements(&mut self) -> Vec<DocId> {
        self.by_key.clear();
        std::mem::take(&mut self.elements)
    }
}

impl<'a> IntoIterator for &'a ReferenceSet {
    type Item = DocId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, DocId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter().copied()
    }
}
