use crate::{
    relief::{all, create, find, members, text, Plan, Refugee, Volunteer},
    DocId, Error, Fields, Model, Result, Store, TypeDef,
};

/// A relief camp, keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Camp(DocId);

impl Model for Camp {
    const TYPE: &'static str = "Camp";

    fn definition() -> TypeDef {
        TypeDef::indexed(module_path!(), Self::TYPE)
            .identity("name")
            .field("capacity")
            .references_to("volunteers", Volunteer::TYPE)
            .references_to("refugees", Refugee::TYPE)
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl Camp {
    /// Opens a camp.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIdentity`] if a camp of the same name
    /// exists.
    pub fn create(store: &mut Store, name: &str, capacity: Option<u32>) -> Result<Self> {
        create(
            store,
            Fields::new().with("name", name).with("capacity", capacity),
        )
    }

    /// Looks up a camp by name.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn find(store: &mut Store, name: &str) -> Result<Option<Self>> {
        find(store, name)
    }

    /// Every camp.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn all(store: &mut Store) -> Result<Vec<Self>> {
        all(store)
    }

    /// The camp's name.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn name(self, store: &Store) -> Result<String> {
        text(store, self.0, "name")
    }

    /// How many refugees the camp can hold, if known.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn capacity(self, store: &Store) -> Result<Option<i64>> {
        Ok(store.value(self.0, "capacity")?.as_int())
    }

    /// Changes the camp's capacity.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn set_capacity(self, store: &mut Store, capacity: Option<u32>) -> Result<()> {
        store.set(self.0, "capacity", capacity)
    }

    /// Volunteers assigned to the camp, in assignment order.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn volunteers(self, store: &Store) -> Result<Vec<Volunteer>> {
        members(store, self.0, "volunteers")
    }

    /// Refugee families in the camp, in admission order.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn refugees(self, store: &Store) -> Result<Vec<Refugee>> {
        members(store, self.0, "refugees")
    }

    /// Assigns a volunteer to the camp.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn add_volunteer(self, store: &mut Store, volunteer: Volunteer) -> Result<()> {
        store.add(self.0, "volunteers", &[volunteer.id()])
    }

    /// Withdraws a volunteer from the camp.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if the volunteer is not assigned here.
    pub fn remove_volunteer(self, store: &mut Store, volunteer: Volunteer) -> Result<()> {
        store.remove(self.0, "volunteers", volunteer.id())
    }

    /// Admits a refugee family.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn admit_refugee(self, store: &mut Store, refugee: Refugee) -> Result<()> {
        store.add(self.0, "refugees", &[refugee.id()])
    }

    /// Discharges a refugee family.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if the family is not in this camp.
    pub fn discharge_refugee(self, store: &mut Store, refugee: Refugee) -> Result<()> {
        store.remove(self.0, "refugees", refugee.id())
    }

    /// The plan the camp belongs to.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn plan(self, store: &Store) -> Result<Option<Plan>> {
        match store.find_referred_by(self.0, Some(Plan::TYPE), Some("camps")) {
            Ok(id) => Ok(Some(Plan::from_id(id))),
            Err(Error::ReferrerNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Closes the camp for good, removing it from its plan.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn delete(self, store: &mut Store) -> Result<()> {
        store.delete(self.0)
    }
}
