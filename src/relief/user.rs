use crate::{
    relief::{all, create, find, text},
    DocId, Fields, Model, Result, Store, TypeDef,
};

/// Personal details of an application user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact number.
    pub phone: String,
}

impl Profile {
    fn fields(&self, username: &str) -> Fields {
        Fields::new()
            .with("username", username)
            .with("first_name", self.first_name.as_str())
            .with("last_name", self.last_name.as_str())
            .with("phone", self.phone.as_str())
    }
}

/// What a user is allowed to do, derived from their stored type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Manages plans, camps and volunteer accounts.
    Admin,
    /// Looks after a camp and its refugees.
    Volunteer,
    /// Neither of the above.
    User,
}

/// An account of the relief application, keyed by username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct User(DocId);

impl Model for User {
    const TYPE: &'static str = "User";

    fn definition() -> TypeDef {
        TypeDef::indexed(module_path!(), Self::TYPE)
            .identity("username")
            .field("first_name")
            .field("last_name")
            .field("phone")
            .field("account_activated")
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl User {
    /// Looks up any user, volunteers and admins included.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn find(store: &mut Store, username: &str) -> Result<Option<Self>> {
        find(store, username)
    }

    /// Every user, volunteers and admins included.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn all(store: &mut Store) -> Result<Vec<Self>> {
        all(store)
    }

    /// The username.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn username(self, store: &Store) -> Result<String> {
        text(store, self.0, "username")
    }

    /// The user's personal details.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn profile(self, store: &Store) -> Result<Profile> {
        Ok(Profile {
            first_name: text(store, self.0, "first_name")?,
            last_name: text(store, self.0, "last_name")?,
            phone: text(store, self.0, "phone")?,
        })
    }

    /// Replaces the user's personal details.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn set_profile(self, store: &mut Store, profile: Profile) -> Result<()> {
        store.set(self.0, "first_name", profile.first_name)?;
        store.set(self.0, "last_name", profile.last_name)?;
        store.set(self.0, "phone", profile.phone)
    }

    /// Whether the account may log in.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn is_activated(self, store: &Store) -> Result<bool> {
        Ok(store
            .value(self.0, "account_activated")?
            .as_bool()
            .unwrap_or_default())
    }

    /// Activates or deactivates the account.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn set_activated(self, store: &mut Store, activated: bool) -> Result<()> {
        store.set(self.0, "account_activated", activated)
    }

    /// The user's role.
    ///
    /// # Errors
    ///
    /// Fails if the handle does not belong to `store`.
    pub fn role(self, store: &Store) -> Result<Role> {
        let schema = store.record(self.0)?.schema();
        Ok(if schema.is_a(Admin::TYPE) {
            Role::Admin
        } else if schema.is_a(Volunteer::TYPE) {
            Role::Volunteer
        } else {
            Role::User
        })
    }

    /// Deletes the account.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be written.
    pub fn delete(self, store: &mut Store) -> Result<()> {
        store.delete(self.0)
    }
}

/// A volunteer account. Volunteers are also stored as users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Volunteer(DocId);

impl Model for Volunteer {
    const TYPE: &'static str = "Volunteer";

    fn definition() -> TypeDef {
        TypeDef::indexed(module_path!(), Self::TYPE).extends(User::TYPE)
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl From<Volunteer> for User {
    fn from(volunteer: Volunteer) -> Self {
        Self(volunteer.0)
    }
}

impl Volunteer {
    /// Creates a volunteer account.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateIdentity`](crate::Error::DuplicateIdentity)
    /// if any user already has this username.
    pub fn create(
        store: &mut Store,
        username: &str,
        profile: &Profile,
        activated: bool,
    ) -> Result<Self> {
        let fields = profile
            .fields(username)
            .with("account_activated", activated);
        create(store, fields)
    }

    /// Looks up a volunteer.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn find(store: &mut Store, username: &str) -> Result<Option<Self>> {
        find(store, username)
    }

    /// Every volunteer.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn all(store: &mut Store) -> Result<Vec<Self>> {
        all(store)
    }

    /// The volunteer as a plain user.
    #[must_use]
    pub fn user(self) -> User {
        self.into()
    }
}

/// An administrator account. Administrators are also stored as users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Admin(DocId);

impl Model for Admin {
    const TYPE: &'static str = "Admin";

    fn definition() -> TypeDef {
        TypeDef::indexed(module_path!(), Self::TYPE).extends(User::TYPE)
    }

    fn from_id(id: DocId) -> Self {
        Self(id)
    }

    fn id(&self) -> DocId {
        self.0
    }
}

impl From<Admin> for User {
    fn from(admin: Admin) -> Self {
        Self(admin.0)
    }
}

impl Admin {
    /// The username of the administrator created on first start.
    pub const INITIAL_USERNAME: &'static str = "root";

    /// Creates an activated administrator account.
    ///
    /// # Errors
    ///
    /// Fails if any user already has this username.
    pub fn create(store: &mut Store, username: &str, profile: &Profile) -> Result<Self> {
        let fields = profile.fields(username).with("account_activated", true);
        create(store, fields)
    }

    /// Every administrator.
    ///
    /// # Errors
    ///
    /// Fails if the collection cannot be read.
    pub fn all(store: &mut Store) -> Result<Vec<Self>> {
        all(store)
    }

    /// Creates the initial administrator unless one already exists.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or written.
    pub fn configure_initial_user(store: &mut Store) -> Result<Option<Self>> {
        if !Self::all(store)?.is_empty() {
            return Ok(None);
        }
        tracing::info!("Creating initial administrator {}", Self::INITIAL_USERNAME);
        Self::create(store, Self::INITIAL_USERNAME, &Profile::default()).map(Some)
    }

    /// The administrator as a plain user.
    #[must_use]
    pub fn user(self) -> User {
        self.into()
    }
}
