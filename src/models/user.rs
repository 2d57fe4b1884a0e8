use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use serde::{Deserialize, Deserializer, Serialize};

use crate::entity::Entity;

pub const NAME_FIELD: &str = "Name";
pub const EMAIL_FIELD: &str = "Email";

/// A user record stored in the `User` collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(rename = "Email", default, deserialize_with = "null_as_empty")]
    pub email: String,
}

// Stored nulls read back as empty strings.
fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: None, name: name.into(), email: email.into() }
    }
}

impl Entity for User {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// `n` users with generated names and emails, without ids.
#[must_use]
pub fn fake_users(n: usize) -> Vec<User> {
    (0..n).map(|_| User::new(Name().fake::<String>(), SafeEmail().fake::<String>())).collect()
}
