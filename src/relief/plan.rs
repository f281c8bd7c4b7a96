use std::{fmt, str::FromStr};

use chrono::NaiveDate;

use crate::{
    relief::{all, create, find, members, text, Camp},
    DocId, Fields, Model, Result, Store, TypeDef,
};

/// The kind of emergency a plan responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmergencyType {
    /// Earthquake.
    Earthquake,
    /// Wildfire.
    Fire,
    /// Flood.
    Flood,
    /// Tsunami.
    Tsunami,
    /// Storm.
    Storm,
}

impl EmergencyType {
    /// Every emergency type, in display order.
    pub const ALL: [Self; 5] = [
        Self::Earthquake,
        Self::Fire,
        Self::Flood,
        Self::Tsunami,
        Self::Storm,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Fire => "fire",
            Self::Flood => "flood",
            Self::Tsunami => "tsunami",
            Self::Storm => "storm",
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The text is not a known emergency type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emergency type '{0}'")]
pub struct UnknownEmergencyType(pub String);

impl FromStr for EmergencyType {
    type Err = UnknownEmergencyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEmergencyType(s.to_string()))
    }
}

/// The details of a new plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan<'a> {
    /// Unique name.
    pub name: &'a str,
    /// The emergency responded to.
    pub emergency_type: EmergencyType,
    /// Free text description.
    pub description: &'a str,
    /// Where the emergency is.
    pub geographical_area: &'a str,
    /// When the plan takes effect.
    pub start_date: NaiveDate,
    /// Camps opened from the start.
    pub camps: &'a [Camp],
}

/// An emergency-relief plan, keyed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Plan(DocId);

impl Model for Plan {
    const TYPE: &'static str = "Plan";

    fn definition() -> TypeDef {
        TypeDef::indexed(module_path!(), Self::TYPE)
            .identity("name")
            .field("emergency_type")
            .field("description")
            .field("geographical_area")
            .field("start_date")
            .references_to("camps", Camp::TYPE)
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl Plan {
    /// Creates a plan.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIdentity`](crate::Error::DuplicateIdentity)
    /// if a plan of the same name exists.
    pub fn create(store: &mut Store, plan: &NewPlan<'_>) -> Result<Self> {
        let fields = Fields::new()
            .with("name", plan.name)
            .with("emergency_type", plan.emergency_type.as_str())
            .with("description", plan.description)
            .with("geographical_area", plan.geographical_area)
            .with("start_date", plan.start_date)
            .with_refs("camps", plan.camps.iter().map(Model::id));
        create(store, fields)
    }

    /// Looks up a plan by name.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn find(store: &mut Store, name: &str) -> Result<Option<Self>> {
        find(store, name)
    }

    /// Every plan.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn all(store: &mut Store) -> Result<Vec<Self>> {
        all(store)
    }

    /// The plan's name.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn name(self, store: &Store) -> Result<String> {
        text(store, self.0, "name")
    }

    /// The emergency responded to, if the stored value is recognised.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn emergency_type(self, store: &Store) -> Result<Option<EmergencyType>> {
        Ok(text(store, self.0, "emergency_type")?.parse().ok())
    }

    /// Free text description.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn description(self, store: &Store) -> Result<String> {
        text(store, self.0, "description")
    }

    /// Where the emergency is.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn geographical_area(self, store: &Store) -> Result<String> {
        text(store, self.0, "geographical_area")
    }

    /// When the plan takes effect.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn start_date(self, store: &Store) -> Result<Option<NaiveDate>> {
        Ok(store.value(self.0, "start_date")?.as_date())
    }

    /// The plan's camps, in opening order.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn camps(self, store: &Store) -> Result<Vec<Camp>> {
        members(store, self.0, "camps")
    }

    /// Adds camps to the plan. Camps already open are left as they are.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn open_camps(self, store: &mut Store, camps: &[Camp]) -> Result<()> {
        let ids: Vec<_> = camps.iter().map(Model::id).collect();
        store.add(self.0, "camps", &ids)
    }

    /// Removes camps from the plan. Camps not in the plan are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn close_camps(self, store: &mut Store, camps: &[Camp]) -> Result<()> {
        for camp in camps {
            if store.contains(self.0, "camps", camp.id())? {
                store.remove(self.0, "camps", camp.id())?;
            }
        }
        Ok(())
    }

    /// Deletes the plan. Its camps stay open.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn delete(self, store: &mut Store) -> Result<()> {
        store.delete(self.0)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::relief::registry;

    fn setup_temp_store() -> (TempDir, Store) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let store = Store::open(tmp.path(), registry().unwrap());
        (tmp, store)
    }

    fn new_plan<'a>(name: &'a str, camps: &'a [Camp]) -> NewPlan<'a> {
        NewPlan {
            name,
            emergency_type: EmergencyType::Flood,
            description: "Flooding along the river",
            geographical_area: "UK",
            start_date: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
            camps,
        }
    }

    #[test_case("fire", Ok(EmergencyType::Fire); "lowercase")]
    #[test_case("Tsunami", Ok(EmergencyType::Tsunami); "capitalised")]
    #[test_case("drought", Err(UnknownEmergencyType("drought".to_string())); "unknown")]
    fn parse_emergency_type(input: &str, expected: Result<EmergencyType, UnknownEmergencyType>) {
        assert_eq!(input.parse::<EmergencyType>(), expected);
    }

    #[test]
    fn plans_survive_a_reload() {
        let (_tmp, mut store) = setup_temp_store();
        let camps = [
            Camp::create(&mut store, "camp1", None).unwrap(),
            Camp::create(&mut store, "camp2", None).unwrap(),
        ];
        Plan::create(&mut store, &new_plan("plan1", &camps)).unwrap();

        store.reload();

        let plan = Plan::find(&mut store, "plan1").unwrap().unwrap();
        assert_eq!(
            plan.emergency_type(&store).unwrap(),
            Some(EmergencyType::Flood)
        );
        assert_eq!(plan.geographical_area(&store).unwrap(), "UK");
        assert_eq!(plan.description(&store).unwrap(), "Flooding along the river");
        assert_eq!(
            plan.start_date(&store).unwrap(),
            NaiveDate::from_ymd_opt(2022, 3, 1)
        );
        let names: Vec<_> = plan
            .camps(&store)
            .unwrap()
            .into_iter()
            .map(|camp| camp.name(&store).unwrap())
            .collect();
        assert_eq!(names, ["camp1", "camp2"]);
    }

    #[test]
    fn camps_know_their_plan() {
        let (_tmp, mut store) = setup_temp_store();
        let camp = Camp::create(&mut store, "camp1", None).unwrap();
        let plan = Plan::create(&mut store, &new_plan("plan1", &[camp])).unwrap();

        assert_eq!(camp.plan(&store).unwrap(), Some(plan));

        store.reload();
        let camp = Camp::find(&mut store, "camp1").unwrap().unwrap();
        let plan = camp.plan(&store).unwrap().unwrap();
        assert_eq!(plan.name(&store).unwrap(), "plan1");
    }

    #[test]
    fn opening_and_closing_camps() {
        let (_tmp, mut store) = setup_temp_store();
        let camp1 = Camp::create(&mut store, "camp1", None).unwrap();
        let camp2 = Camp::create(&mut store, "camp2", None).unwrap();
        let camp3 = Camp::create(&mut store, "camp3", None).unwrap();
        let plan = Plan::create(&mut store, &new_plan("plan1", &[camp1])).unwrap();

        plan.open_camps(&mut store, &[camp2, camp3, camp1]).unwrap();
        assert_eq!(plan.camps(&store).unwrap(), [camp1, camp2, camp3]);

        plan.close_camps(&mut store, &[camp1, camp3]).unwrap();
        plan.close_camps(&mut store, &[camp1]).unwrap();
        assert_eq!(plan.camps(&store).unwrap(), [camp2]);
        assert_eq!(camp1.plan(&store).unwrap(), None);
    }

    #[test]
    fn closing_a_camp_removes_it_from_its_plan() {
        let (_tmp, mut store) = setup_temp_store();
        let camp1 = Camp::create(&mut store, "camp1", None).unwrap();
        let camp2 = Camp::create(&mut store, "camp2", None).unwrap();
        Plan::create(&mut store, &new_plan("plan1", &[camp1, camp2])).unwrap();

        camp1.delete(&mut store).unwrap();
        store.reload();

        let plan = Plan::find(&mut store, "plan1").unwrap().unwrap();
        assert_eq!(plan.camps(&store).unwrap().len(), 1);
        assert!(Camp::find(&mut store, "camp1").unwrap().is_none());
    }
}
