use super::user::{NAME_FIELD, User};
use crate::errors::SessionError;
use crate::params::DbQueryParams;
use crate::query::Filter;
use crate::session::Session;

/// User operations over a [`Session`].
#[derive(Debug, Clone)]
pub struct UserRepository {
    session: Session,
}

impl UserRepository {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Insert; the returned user carries its new id.
    ///
    /// # Errors
    /// Duplicate id or backend failures.
    pub fn add(&self, mut user: User) -> Result<User, SessionError> {
        self.session.add(&mut user)?;
        Ok(user)
    }

    /// Save, inserting when the user does not exist yet.
    ///
    /// # Errors
    /// Backend failures.
    pub fn edit(&self, mut user: User) -> Result<User, SessionError> {
        self.session.save(&mut user)?;
        Ok(user)
    }

    /// # Errors
    /// Backend failures.
    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, SessionError> {
        self.session.single(&Filter::eq("_id", id))
    }

    /// # Errors
    /// Backend failures.
    pub fn get_all(&self) -> Result<Vec<User>, SessionError> {
        self.session.all()
    }

    /// Returns true when a user was removed.
    ///
    /// # Errors
    /// Backend failures.
    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self.session.delete::<User>(id)? > 0)
    }

    /// Users whose name contains `needle` (case-insensitive, literal), ordered by name.
    ///
    /// # Errors
    /// Backend failures.
    pub fn lambda_search(&self, needle: &str) -> Result<Vec<User>, SessionError> {
        let mut users: Vec<User> = self.session.select(&Filter::contains_ci(NAME_FIELD, needle))?;
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    /// Regex search on the name field.
    ///
    /// # Errors
    /// Backend failures or an invalid pattern.
    pub fn search(&self, pattern: &str) -> Result<Vec<User>, SessionError> {
        self.session.search::<User, _, _>([(NAME_FIELD, pattern)])
    }

    /// # Errors
    /// Backend failures or an invalid pattern.
    pub fn get_page(&self, params: &DbQueryParams) -> Result<Vec<User>, SessionError> {
        self.session.page(params)
    }
}
