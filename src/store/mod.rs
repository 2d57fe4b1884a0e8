//! Storage backends behind [`crate::session::Session`].

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use bson::{Bson, Document as BsonDocument};

use crate::errors::SessionError;
use crate::query::{Filter, FindOptions, IndexSpec};

/// Document-level operations a session forwards to.
///
/// Implementations receive typed [`Filter`]s; the driver-backed store renders them to
/// query documents, the in-memory store evaluates them directly.
pub trait DocumentStore: Send + Sync {
    /// Matching documents, sorted and windowed per `opts`.
    ///
    /// # Errors
    /// Backend failures or invalid filters.
    fn find(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>, SessionError>;

    /// Number of matching documents.
    ///
    /// # Errors
    /// Backend failures or invalid filters.
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError>;

    /// Number of documents in the collection, from metadata when the backend has it.
    ///
    /// # Errors
    /// Backend failures.
    fn estimated_count(&self, collection: &str) -> Result<u64, SessionError>;

    /// # Errors
    /// Duplicate `_id` or backend failures.
    fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<(), SessionError>;

    /// # Errors
    /// Duplicate `_id` or backend failures.
    fn insert_many(&self, collection: &str, docs: Vec<BsonDocument>) -> Result<(), SessionError>;

    /// Replace the document with `_id == id`; insert it when absent and `upsert` is set.
    /// Returns true when a document was matched or inserted.
    ///
    /// # Errors
    /// Backend failures.
    fn replace_one(&self, collection: &str, id: &Bson, doc: BsonDocument, upsert: bool) -> Result<bool, SessionError>;

    /// Delete the first matching document. Returns the number removed (0 or 1).
    ///
    /// # Errors
    /// Backend failures or invalid filters.
    fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError>;

    /// # Errors
    /// Backend failures or invalid filters.
    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError>;

    /// Drop the collection with its indexes. Dropping a missing collection is not an error.
    ///
    /// # Errors
    /// Backend failures.
    fn drop_collection(&self, collection: &str) -> Result<(), SessionError>;

    /// Create an index if an identical one does not exist yet.
    ///
    /// # Errors
    /// Backend failures, or a conflicting index definition.
    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), SessionError>;
}
