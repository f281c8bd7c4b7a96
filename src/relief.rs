//! Models of the emergency-relief application
//!
//! Each model is a typed handle over a document held by a [`Store`]. The
//! handles are `Copy` and carry no data of their own; every accessor reads
//! through the store, and every mutation is written through immediately.
//!
//! ```no_run
//! use relief_store::{relief, Store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::open(".", relief::registry()?);
//! for camp in relief::Camp::all(&mut store)? {
//!     println!("{}", camp.name(&store)?);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;

use crate::{DocId, Fields, Key, Model, Registry, Result, SchemaError, Store};

mod camp;
mod plan;
mod refugee;
mod user;

pub use camp::Camp;
pub use plan::{EmergencyType, NewPlan, Plan, UnknownEmergencyType};
pub use refugee::{NewRefugee, Refugee};
pub use user::{Admin, Profile, Role, User, Volunteer};

/// Registers every relief model.
///
/// # Errors
///
/// Fails only if a model definition is invalid.
pub fn registry() -> Result<Registry, SchemaError> {
    let mut registry = Registry::new();
    registry.register_model::<User>()?;
    registry.register_model::<Volunteer>()?;
    registry.register_model::<Admin>()?;
    registry.register_model::<Refugee>()?;
    registry.register_model::<Camp>()?;
    registry.register_model::<Plan>()?;
    Ok(registry)
}

/// Replaces the contents of the store with a small sample data set.
///
/// Two plans share five camps, three volunteers are assigned to camps, one
/// refugee family is admitted, and the initial administrator is configured.
///
/// # Errors
///
/// Fails if the store cannot be written.
pub fn seed(store: &mut Store) -> Result<()> {
    for type_name in [Plan::TYPE, Camp::TYPE, User::TYPE] {
        store.delete_all(type_name)?;
    }

    Admin::configure_initial_user(store)?;

    let camps1 = ["camp1", "camp2", "camp3"]
        .into_iter()
        .map(|name| Camp::create(store, name, None))
        .collect::<Result<Vec<_>>>()?;
    let camps2 = ["camp4", "camp5"]
        .into_iter()
        .map(|name| Camp::create(store, name, None))
        .collect::<Result<Vec<_>>>()?;

    let start_date = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default();
    Plan::create(
        store,
        &NewPlan {
            name: "plan1",
            emergency_type: EmergencyType::Fire,
            description: "This is Plan 1",
            geographical_area: "World",
            start_date,
            camps: &camps1,
        },
    )?;
    Plan::create(
        store,
        &NewPlan {
            name: "plan2",
            emergency_type: EmergencyType::Flood,
            description: "This is Plan 2",
            geographical_area: "UK",
            start_date,
            camps: &camps2,
        },
    )?;

    let volunteers = [("vvv1", "One", false), ("vvv2", "Two", true), ("vvv3", "Three", false)]
        .into_iter()
        .map(|(username, last_name, activated)| {
            let profile = Profile {
                first_name: "Volunteer".to_string(),
                last_name: last_name.to_string(),
                phone: "+44123456789".to_string(),
            };
            Volunteer::create(store, username, &profile, activated)
        })
        .collect::<Result<Vec<_>>>()?;

    camps1[0].add_volunteer(store, volunteers[0])?;
    camps1[1].add_volunteer(store, volunteers[1])?;
    camps2[0].add_volunteer(store, volunteers[2])?;

    let refugee = Refugee::create(
        store,
        &NewRefugee {
            first_name: "Refugee",
            last_name: "One",
            family_members: 4,
            starting_date: NaiveDate::from_ymd_opt(2021, 5, 4).unwrap_or_default(),
            medical_condition: None,
        },
    )?;
    camps1[0].admit_refugee(store, refugee)?;

    tracing::info!("Seeded sample data into {}", store.data_dir().display());
    Ok(())
}

/// Looks up a model by identity.
fn find<M: Model>(store: &mut Store, key: impl Into<Key>) -> Result<Option<M>> {
    Ok(store.find(M::TYPE, key)?.map(M::from_id))
}

/// Every stored model of a type, in insertion order.
fn all<M: Model>(store: &mut Store) -> Result<Vec<M>> {
    Ok(store.all(M::TYPE)?.into_iter().map(M::from_id).collect())
}

fn create<M: Model>(store: &mut Store, fields: Fields) -> Result<M> {
    store.create(M::TYPE, fields).map(M::from_id)
}

/// Elements of a reference set, as typed handles.
fn members<M: Model>(store: &Store, owner: DocId, field: &str) -> Result<Vec<M>> {
    Ok(store.references(owner, field)?.iter().map(M::from_id).collect())
}

fn text(store: &Store, id: DocId, field: &str) -> Result<String> {
    Ok(store
        .value(id, field)?
        .as_text()
        .unwrap_or_default()
        .to_string())
}
