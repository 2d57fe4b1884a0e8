use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{SessionConfig, local_uri};
use crate::entity::Entity;
use crate::errors::SessionError;
use crate::params::{DEFAULT_PAGE_SIZE, DbQueryParams, QueryOperator};
use crate::query::{
    self, Filter, FindOptions, IndexKind, IndexSpec, array_contains, descending_by, exact_filter,
    near_sphere, object_array_contains, search_filter, sort_specs,
};
use crate::store::{DocumentStore, MemoryStore, MongoStore};
use crate::telemetry::{Telemetry, TelemetryConfig};

/// Field covered by the TTL index.
pub const TTL_FIELD: &str = "Date";
/// Expiry of the TTL index: six hours.
pub const TTL_SECONDS: u64 = 21_600;

/// Typed data-access session. Each entity type maps to its own collection
/// (see [`Entity::collection_name`]); every call forwards to one store operation.
///
/// Cloning is cheap and clones share the store and counters.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn DocumentStore>,
    telemetry: Arc<Telemetry>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("db", &self.telemetry.cfg.read().db_name).finish()
    }
}

impl Session {
    /// Session over a MongoDB deployment.
    ///
    /// # Errors
    /// Returns an error if the connection string is invalid.
    pub fn connect(connection_string: &str, db_name: &str) -> Result<Self, SessionError> {
        let store = MongoStore::connect(connection_string, db_name)?;
        Ok(Self::with_store_named(Arc::new(store), db_name))
    }

    /// Session over `db_name` on the local default server (`127.0.0.1:27017`).
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn local(db_name: &str) -> Result<Self, SessionError> {
        Self::connect(&local_uri(db_name), db_name)
    }

    /// Session over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store_named(Arc::new(MemoryStore::new()), "memory")
    }

    #[must_use]
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_store_named(store, "default")
    }

    fn with_store_named(store: Arc<dyn DocumentStore>, db_name: &str) -> Self {
        let cfg = TelemetryConfig { db_name: db_name.to_string(), ..TelemetryConfig::default() };
        Self { store, telemetry: Arc::new(Telemetry::new(cfg)) }
    }

    /// Session built from the effective configuration.
    ///
    /// # Errors
    /// Returns an error if the connection string is invalid.
    pub fn from_config(cfg: &SessionConfig) -> Result<Self, SessionError> {
        let session = Self::connect(&cfg.connection_string(), cfg.db_name())?;
        if let Some(ms) = cfg.slow_op_ms {
            session.telemetry.set_slow_op_ms(ms);
        }
        Ok(session)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // --- plumbing ---

    fn observe<R>(
        &self,
        op: &str,
        collection: &str,
        results: impl Fn(&R) -> Option<usize>,
        f: impl FnOnce(&dyn DocumentStore) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        log::debug!("{op} on {collection}");
        let started = Instant::now();
        let res = f(self.store.as_ref());
        if let Err(e) = &res {
            log::error!("{op} on {collection} failed: {e}");
        }
        self.telemetry.record_op(op, collection, started, res.as_ref().ok().and_then(&results), res.is_ok());
        res
    }

    fn find_as<T: Entity>(&self, op: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<T>, SessionError> {
        let collection = T::collection_name();
        self.observe(op, collection, |v: &Vec<T>| Some(v.len()), |store| {
            store.find(collection, filter, opts)?.into_iter().map(decode::<T>).collect()
        })
    }

    // --- delete / drop ---

    /// Remove the document whose `_id` equals `id`.
    ///
    /// # Errors
    /// Backend failures.
    pub fn delete<T: Entity>(&self, id: &str) -> Result<u64, SessionError> {
        let collection = T::collection_name();
        let filter = Filter::eq("_id", id);
        let n = self.observe("delete", collection, |_| None, |s| s.delete_one(collection, &filter))?;
        self.telemetry.record_write("delete", collection, &format!("_id={id} deleted={n}"));
        Ok(n)
    }

    /// Remove every document matching `filter`.
    ///
    /// # Errors
    /// Backend failures or invalid filters.
    pub fn delete_where<T: Entity>(&self, filter: &Filter) -> Result<u64, SessionError> {
        let collection = T::collection_name();
        let n = self.observe("delete_many", collection, |_| None, |s| s.delete_many(collection, filter))?;
        self.telemetry.record_write("delete_many", collection, &format!("deleted={n}"));
        Ok(n)
    }

    /// # Errors
    /// Backend failures.
    pub fn drop_collection<T: Entity>(&self) -> Result<(), SessionError> {
        let collection = T::collection_name();
        self.observe("drop", collection, |_| None, |s| s.drop_collection(collection))?;
        self.telemetry.record_write("drop", collection, "");
        Ok(())
    }

    // --- reads ---

    /// The single document matching `filter`, or `None`.
    ///
    /// # Errors
    /// [`SessionError::MultipleResults`] when more than one document matches.
    pub fn single<T: Entity>(&self, filter: &Filter) -> Result<Option<T>, SessionError> {
        let opts = FindOptions { limit: Some(2), ..FindOptions::default() };
        let mut found = self.find_as::<T>("single", filter, &opts)?;
        if found.len() > 1 {
            return Err(SessionError::MultipleResults(T::collection_name().to_string()));
        }
        Ok(found.pop())
    }

    /// Every document matching `filter`.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn select<T: Entity>(&self, filter: &Filter) -> Result<Vec<T>, SessionError> {
        self.find_as("select", filter, &FindOptions::default())
    }

    /// # Errors
    /// Backend or decode failures.
    pub fn all<T: Entity>(&self) -> Result<Vec<T>, SessionError> {
        self.find_as("all", &Filter::True, &FindOptions::default())
    }

    /// One page of a regex search described by `params`.
    ///
    /// # Errors
    /// Backend or decode failures, or an invalid pattern.
    pub fn page<T: Entity>(&self, params: &DbQueryParams) -> Result<Vec<T>, SessionError> {
        let filter = search_filter(params.query_params.iter().map(|(k, v)| (k.as_str(), v.as_str())), params.operator);
        let sort = (!params.sort_params.is_empty())
            .then(|| sort_specs(params.sort_params.iter().map(|(k, asc)| (k.as_str(), *asc))));
        let opts = FindOptions { sort, skip: Some(params.skip_records), limit: limit_of(params.count) };
        self.find_as("page", &filter, &opts)
    }

    /// A window over the whole collection, newest first by `order_by` when given.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn page_all<T: Entity>(&self, skip: u64, limit: u64, order_by: Option<&str>) -> Result<Vec<T>, SessionError> {
        self.page_where::<T>(&Filter::True, skip, limit, order_by)
    }

    /// A window over the documents matching `filter`, descending by `order_by` when given.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn page_where<T: Entity>(
        &self,
        filter: &Filter,
        skip: u64,
        limit: u64,
        order_by: Option<&str>,
    ) -> Result<Vec<T>, SessionError> {
        let opts = FindOptions { sort: descending_by(order_by), skip: Some(skip), limit: limit_of(limit) };
        self.find_as("page", filter, &opts)
    }

    /// Regex search with `Or` between the fields.
    ///
    /// # Errors
    /// Backend or decode failures, or an invalid pattern.
    pub fn search<T, K, V>(&self, params: impl IntoIterator<Item = (K, V)>) -> Result<Vec<T>, SessionError>
    where
        T: Entity,
        K: Into<String>,
        V: AsRef<str>,
    {
        self.search_with(params, QueryOperator::Or)
    }

    /// Regex search: each value is matched case-insensitively anywhere in its field.
    ///
    /// # Errors
    /// Backend or decode failures, or an invalid pattern.
    pub fn search_with<T, K, V>(
        &self,
        params: impl IntoIterator<Item = (K, V)>,
        op: QueryOperator,
    ) -> Result<Vec<T>, SessionError>
    where
        T: Entity,
        K: Into<String>,
        V: AsRef<str>,
    {
        self.find_as("search", &search_filter(params, op), &FindOptions::default())
    }

    /// Full-text search over the text index; first 50 results.
    ///
    /// # Errors
    /// Backend or decode failures; the collection needs a text index.
    pub fn text_search<T: Entity>(&self, search: &str) -> Result<Vec<T>, SessionError> {
        self.text_search_paged(search, 0, DEFAULT_PAGE_SIZE, None)
    }

    /// Full-text search with a window, descending by `order_by` when given.
    ///
    /// # Errors
    /// Backend or decode failures; the collection needs a text index.
    pub fn text_search_paged<T: Entity>(
        &self,
        search: &str,
        skip: u64,
        limit: u64,
        order_by: Option<&str>,
    ) -> Result<Vec<T>, SessionError> {
        let opts = FindOptions {
            sort: descending_by(order_by),
            skip: (skip > 0).then_some(skip),
            limit: limit_of(limit),
        };
        self.find_as("text_search", &query::text(search), &opts)
    }

    /// Exact search with `And` between the fields.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn search_exact<T, K>(&self, params: impl IntoIterator<Item = (K, Option<Bson>)>) -> Result<Vec<T>, SessionError>
    where
        T: Entity,
        K: Into<String>,
    {
        self.search_exact_with(params, QueryOperator::And)
    }

    /// Exact search: a value must match the whole field case-insensitively; `None` matches null or missing.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn search_exact_with<T, K>(
        &self,
        params: impl IntoIterator<Item = (K, Option<Bson>)>,
        op: QueryOperator,
    ) -> Result<Vec<T>, SessionError>
    where
        T: Entity,
        K: Into<String>,
    {
        self.find_as("search_exact", &exact_filter(params, op), &FindOptions::default())
    }

    /// Documents whose array `array_name` contains `value`, e.g. `{names: ["john", "sarah"]}`.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn search_array<T: Entity>(&self, array_name: &str, value: &str) -> Result<Vec<T>, SessionError> {
        self.find_as("search_array", &array_contains(array_name, value), &FindOptions::default())
    }

    /// Documents whose array of objects has an element with `key == value`,
    /// e.g. `{contacts: [{name: "john", id: 1}]}`.
    ///
    /// # Errors
    /// Backend or decode failures.
    pub fn search_object_array<T: Entity>(&self, array_name: &str, key: &str, value: &str) -> Result<Vec<T>, SessionError> {
        let filter = object_array_contains(array_name, key, value);
        self.find_as("search_object_array", &filter, &FindOptions::default())
    }

    /// `$nearSphere` query on `geo_field` (a GeoJSON point, dotted paths allowed),
    /// nearest first, within `max_distance` meters.
    ///
    /// # Errors
    /// Backend or decode failures; the server requires a `2dsphere` index on the field.
    pub fn geo_near<T: Entity>(
        &self,
        geo_field: &str,
        longitude: f64,
        latitude: f64,
        max_distance: f64,
    ) -> Result<Vec<T>, SessionError> {
        let filter = near_sphere(geo_field, longitude, latitude, max_distance);
        self.find_as("geo_near", &filter, &FindOptions::default())
    }

    // --- counts ---

    /// Collection size from metadata.
    ///
    /// # Errors
    /// Backend failures.
    pub fn count<T: Entity>(&self) -> Result<u64, SessionError> {
        let collection = T::collection_name();
        self.observe("count", collection, |_| None, |s| s.estimated_count(collection))
    }

    /// Number of documents matching the search part of `params`; paging is ignored.
    ///
    /// # Errors
    /// Backend failures or an invalid pattern.
    pub fn count_matching<T: Entity>(&self, params: &DbQueryParams) -> Result<u64, SessionError> {
        let collection = T::collection_name();
        let filter = search_filter(params.query_params.iter().map(|(k, v)| (k.as_str(), v.as_str())), params.operator);
        self.observe("count", collection, |_| None, |s| s.count(collection, &filter))
    }

    // --- writes ---

    /// Insert `item`, assigning an ObjectId string id when it has none.
    ///
    /// # Errors
    /// Duplicate id, encode or backend failures.
    pub fn add<T: Entity>(&self, item: &mut T) -> Result<(), SessionError> {
        let collection = T::collection_name();
        let id = item.ensure_id();
        let doc = encode(item)?;
        self.observe("insert", collection, |_| None, |s| s.insert_one(collection, doc))?;
        self.telemetry.record_write("insert", collection, &format!("_id={id}"));
        Ok(())
    }

    /// Batch insert, assigning ids where missing. Insertion is ordered and stops at the first failure.
    ///
    /// # Errors
    /// Duplicate id, encode or backend failures.
    pub fn add_many<T: Entity>(&self, items: &mut [T]) -> Result<(), SessionError> {
        let collection = T::collection_name();
        let docs = items
            .iter_mut()
            .map(|item| {
                item.ensure_id();
                encode(&*item)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let n = docs.len();
        self.observe("insert_many", collection, |_| None, |s| s.insert_many(collection, docs))?;
        self.telemetry.record_write("insert_many", collection, &format!("count={n}"));
        Ok(())
    }

    /// Replace the stored document with the same id, inserting when absent.
    ///
    /// # Errors
    /// Encode or backend failures.
    pub fn save<T: Entity>(&self, item: &mut T) -> Result<(), SessionError> {
        let collection = T::collection_name();
        let id = item.ensure_id();
        let doc = encode(item)?;
        let key = Bson::String(id.clone());
        self.observe("save", collection, |_| None, |s| s.replace_one(collection, &key, doc, true))?;
        self.telemetry.record_write("save", collection, &format!("_id={id}"));
        Ok(())
    }

    // --- indexes ---

    /// TTL index on `Date`: documents expire six hours after that timestamp.
    ///
    /// # Errors
    /// Backend failures, or an existing index on `Date` with other options.
    pub fn ensure_ttl_index<T: Entity>(&self) -> Result<(), SessionError> {
        let index = IndexSpec {
            name: None,
            keys: vec![(TTL_FIELD.to_string(), IndexKind::Ascending)],
            expire_after: Some(Duration::from_secs(TTL_SECONDS)),
        };
        self.create_index::<T>(&index)
    }

    /// Text index over `fields`, required by [`Session::text_search`].
    ///
    /// # Errors
    /// Backend failures, or a different text index on the collection.
    pub fn ensure_text_index<T: Entity>(&self, fields: &[&str]) -> Result<(), SessionError> {
        if fields.is_empty() {
            return Err(SessionError::QueryError("text index needs at least one field".into()));
        }
        let index = IndexSpec {
            name: None,
            keys: fields.iter().map(|f| ((*f).to_string(), IndexKind::Text)).collect(),
            expire_after: None,
        };
        self.create_index::<T>(&index)
    }

    fn create_index<T: Entity>(&self, index: &IndexSpec) -> Result<(), SessionError> {
        let collection = T::collection_name();
        self.observe("create_index", collection, |_| None, |s| s.create_index(collection, index))?;
        self.telemetry.record_write("create_index", collection, &index.keys_document().to_string());
        Ok(())
    }
}

fn limit_of(n: u64) -> Option<u64> {
    (n > 0).then_some(n)
}

fn encode<T: Entity>(item: &T) -> Result<BsonDocument, SessionError> {
    Ok(bson::to_document(item)?)
}

fn decode<T: Entity>(doc: BsonDocument) -> Result<T, SessionError> {
    Ok(bson::from_document(doc)?)
}
