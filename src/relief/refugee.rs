use chrono::NaiveDate;

use crate::{
    relief::{text, Camp},
    DocId, Error, Fields, Model, Result, Store, TypeDef,
};

/// The details of a refugee family on admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefugee<'a> {
    /// Given name of the family's representative.
    pub first_name: &'a str,
    /// Family name.
    pub last_name: &'a str,
    /// Number of other family members.
    pub family_members: u32,
    /// First day in the camp.
    pub starting_date: NaiveDate,
    /// Known medical conditions.
    pub medical_condition: Option<&'a str>,
}

/// A refugee family.
///
/// Refugees have no collection of their own; they are stored inside the camp
/// that admitted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Refugee(DocId);

impl Model for Refugee {
    const TYPE: &'static str = "Refugee";

    fn definition() -> TypeDef {
        TypeDef::document(module_path!(), Self::TYPE)
            .field("first_name")
            .field("last_name")
            .field("family_members")
            .field("starting_date")
            .field("medical_condition")
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl Refugee {
    /// Records a refugee family. It is persisted once admitted to a camp.
    ///
    /// # Errors
    ///
    /// Fails only if the model is not registered.
    pub fn create(store: &mut Store, details: &NewRefugee<'_>) -> Result<Self> {
        let fields = Fields::new()
            .with("first_name", details.first_name)
            .with("last_name", details.last_name)
            .with("family_members", details.family_members)
            .with("starting_date", details.starting_date)
            .with("medical_condition", details.medical_condition);
        store.create(Self::TYPE, fields).map(Self)
    }

    /// The family's full name.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn name(self, store: &Store) -> Result<String> {
        let first_name = text(store, self.0, "first_name")?;
        let last_name = text(store, self.0, "last_name")?;
        Ok(format!("{first_name} {last_name}"))
    }

    /// Number of other family members.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn family_members(self, store: &Store) -> Result<i64> {
        Ok(store
            .value(self.0, "family_members")?
            .as_int()
            .unwrap_or_default())
    }

    /// First day in the camp.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn starting_date(self, store: &Store) -> Result<Option<NaiveDate>> {
        Ok(store.value(self.0, "starting_date")?.as_date())
    }

    /// Known medical conditions.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn medical_condition(self, store: &Store) -> Result<Option<String>> {
        Ok(store
            .value(self.0, "medical_condition")?
            .as_text()
            .map(str::to_string))
    }

    /// Updates the known medical conditions.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn set_medical_condition(self, store: &mut Store, condition: Option<&str>) -> Result<()> {
        store.set(self.0, "medical_condition", condition)
    }

    /// The camp that admitted the family.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn camp(self, store: &Store) -> Result<Option<Camp>> {
        match store.find_referred_by(self.0, Some(Camp::TYPE), Some("refugees")) {
            Ok(id) => Ok(Some(Camp::from_id(id))),
            Err(Error::ReferrerNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
