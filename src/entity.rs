use bson::oid::ObjectId;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A document type stored in its own collection with a string `_id`.
///
/// The collection name defaults to the unqualified Rust type name (`User` for
/// `crate::models::User`). Types that should share a collection override
/// [`Entity::collection_name`] to return the shared name.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    fn collection_name() -> &'static str {
        short_type_name::<Self>()
    }

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: String);

    /// Assign a fresh ObjectId string if the entity has no id yet. Returns the id.
    fn ensure_id(&mut self) -> String {
        match self.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = ObjectId::new().to_hex();
                self.set_id(id.clone());
                id
            }
        }
    }
}

/// Last path segment of a type name, with generic arguments stripped.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Place {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    }

    impl Entity for Place {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }
        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Cafe {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    }

    impl Entity for Cafe {
        fn collection_name() -> &'static str {
            Place::collection_name()
        }
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }
        fn set_id(&mut self, id: String) {
            self.id = Some(id);
        }
    }

    #[test]
    fn collection_name_is_unqualified_type_name() {
        assert_eq!(Place::collection_name(), "Place");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn override_shares_collection() {
        assert_eq!(Cafe::collection_name(), "Place");
    }

    #[test]
    fn ensure_id_generates_once() {
        let mut p = Place::default();
        let a = p.ensure_id();
        assert_eq!(a.len(), 24);
        assert!(ObjectId::parse_str(&a).is_ok());
        assert_eq!(p.ensure_id(), a);
    }

    #[test]
    fn ensure_id_replaces_empty_string() {
        let mut p = Place { id: Some(String::new()) };
        assert_eq!(p.ensure_id().len(), 24);
    }
}
