use bson::{Bson, Document as BsonDocument, doc};
use mongodb::IndexModel;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::sync::{Client, Collection, Database};

use super::DocumentStore;
use crate::errors::SessionError;
use crate::query::{Filter, FindOptions, IndexSpec, sort_document};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Store backed by a MongoDB server through the driver's blocking API.
pub struct MongoStore {
    db: Database,
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore").field("db", &self.db.name()).finish()
    }
}

impl MongoStore {
    /// Create a client for `uri` and bind it to `db_name`. The driver connects lazily.
    ///
    /// # Errors
    /// Returns an error if the connection string is invalid.
    pub fn connect(uri: &str, db_name: &str) -> Result<Self, SessionError> {
        let client = Client::with_uri_str(uri)?;
        log::info!("mongo store bound to database '{db_name}'");
        Ok(Self::from_client(&client, db_name))
    }

    /// Bind an existing client to `db_name`.
    #[must_use]
    pub fn from_client(client: &Client, db_name: &str) -> Self {
        Self { db: client.database(db_name) }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection::<BsonDocument>(name)
    }
}

fn map_write_err(e: mongodb::error::Error) -> SessionError {
    let duplicate = match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY_CODE => {
            Some(we.message.clone())
        }
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .find(|we| we.code == DUPLICATE_KEY_CODE)
            .map(|we| we.message.clone()),
        _ => None,
    };
    match duplicate {
        Some(message) => SessionError::DuplicateKey(message),
        None => SessionError::Mongo(e),
    }
}

impl DocumentStore for MongoStore {
    fn find(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>, SessionError> {
        let query = filter.to_document();
        log::debug!("find {collection} {query}");
        let coll = self.collection(collection);
        let mut action = coll.find(query);
        if let Some(sort) = opts.sort.as_deref().filter(|s| !s.is_empty()) {
            action = action.sort(sort_document(sort));
        }
        if let Some(skip) = opts.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = opts.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let cursor = action.run()?;
        Ok(cursor.collect::<Result<Vec<_>, _>>()?)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        Ok(self.collection(collection).count_documents(filter.to_document()).run()?)
    }

    fn estimated_count(&self, collection: &str) -> Result<u64, SessionError> {
        Ok(self.collection(collection).estimated_document_count().run()?)
    }

    fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<(), SessionError> {
        self.collection(collection).insert_one(doc).run().map_err(map_write_err)?;
        Ok(())
    }

    fn insert_many(&self, collection: &str, docs: Vec<BsonDocument>) -> Result<(), SessionError> {
        if docs.is_empty() {
            return Ok(());
        }
        self.collection(collection).insert_many(docs).run().map_err(map_write_err)?;
        Ok(())
    }

    fn replace_one(&self, collection: &str, id: &Bson, doc: BsonDocument, upsert: bool) -> Result<bool, SessionError> {
        let res = self
            .collection(collection)
            .replace_one(doc! { "_id": id.clone() }, doc)
            .upsert(upsert)
            .run()
            .map_err(map_write_err)?;
        Ok(res.matched_count > 0 || res.upserted_id.is_some())
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        Ok(self.collection(collection).delete_one(filter.to_document()).run()?.deleted_count)
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        Ok(self.collection(collection).delete_many(filter.to_document()).run()?.deleted_count)
    }

    fn drop_collection(&self, collection: &str) -> Result<(), SessionError> {
        self.collection(collection).drop().run()?;
        Ok(())
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), SessionError> {
        let options = IndexOptions::builder()
            .name(index.name.clone())
            .expire_after(index.expire_after)
            .build();
        let model = IndexModel::builder().keys(index.keys_document()).options(options).build();
        let created = self.collection(collection).create_index(model).run()?;
        log::debug!("index {} ready on {collection}", created.index_name);
        Ok(())
    }
}
