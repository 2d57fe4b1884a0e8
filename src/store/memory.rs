use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::DocumentStore;
use crate::errors::SessionError;
use crate::query::{
    Filter, FindOptions, IndexSpec, compare_docs, distance_to, eval_filter, lookup, validate_filter,
};

type Clock = Arc<dyn Fn() -> bson::DateTime + Send + Sync>;

#[derive(Debug, Default)]
struct MemCollection {
    docs: Vec<BsonDocument>,
    indexes: Vec<IndexSpec>,
}

impl MemCollection {
    fn text_fields(&self) -> Vec<String> {
        self.indexes.iter().flat_map(IndexSpec::text_fields).map(str::to_string).collect()
    }

    fn position(&self, id: &Bson) -> Option<usize> {
        self.docs.iter().position(|d| d.get("_id") == Some(id))
    }

    fn insert(&mut self, doc: BsonDocument) -> Result<(), SessionError> {
        let doc = if doc.contains_key("_id") {
            doc
        } else {
            let mut with_id = BsonDocument::new();
            with_id.insert("_id", ObjectId::new());
            with_id.extend(doc);
            with_id
        };
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        if self.position(&id).is_some() {
            return Err(SessionError::DuplicateKey(format!("_id: {id}")));
        }
        self.docs.push(doc);
        Ok(())
    }

    // Remove documents whose TTL-indexed date is older than the index's expiry.
    fn sweep_expired(&mut self, now: bson::DateTime) -> usize {
        let before = self.docs.len();
        for index in &self.indexes {
            let (Some(ttl), [(field, _)]) = (index.expire_after, index.keys.as_slice()) else {
                continue;
            };
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            let cutoff = now.timestamp_millis().saturating_sub(ttl_ms);
            self.docs.retain(|d| {
                let oldest = lookup(d, field)
                    .into_iter()
                    .flat_map(|v| match v {
                        Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                        other => vec![other],
                    })
                    .filter_map(|v| match v {
                        Bson::DateTime(dt) => Some(dt.timestamp_millis()),
                        _ => None,
                    })
                    .min();
                oldest.is_none_or(|ms| ms > cutoff)
            });
        }
        before - self.docs.len()
    }
}

/// Process-local store evaluating filters in memory.
///
/// Suited to tests and demos: documents keep insertion order, `_id` is unique per
/// collection, and TTL indexes are swept lazily before each read.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("collections", &self.collection_names())
            .finish()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self { collections: RwLock::new(HashMap::new()), clock: Arc::new(bson::DateTime::now) }
    }

    /// Use `clock` as "now" for TTL expiry.
    #[must_use]
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> bson::DateTime + Send + Sync + 'static,
    {
        Self { collections: RwLock::new(HashMap::new()), clock: Arc::new(clock) }
    }

    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Indexes defined on `collection`.
    #[must_use]
    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections.read().get(collection).map(|c| c.indexes.clone()).unwrap_or_default()
    }

    // Sweep expired documents and check text-index requirements; returns the
    // text-indexed fields of the collection, or `None` when it does not exist.
    fn prepare(
        &self,
        cols: &mut HashMap<String, MemCollection>,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Vec<String>>, SessionError> {
        validate_filter(filter)?;
        let Some(col) = cols.get_mut(collection) else {
            if filter.has_text() {
                return Err(SessionError::TextIndexRequired(collection.to_string()));
            }
            return Ok(None);
        };
        let swept = col.sweep_expired((self.clock)());
        if swept > 0 {
            log::debug!("expired {swept} document(s) from {collection}");
        }
        let text_fields = col.text_fields();
        if filter.has_text() && text_fields.is_empty() {
            return Err(SessionError::TextIndexRequired(collection.to_string()));
        }
        Ok(Some(text_fields))
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Result<Vec<BsonDocument>, SessionError> {
        let mut cols = self.collections.write();
        let Some(text_fields) = self.prepare(&mut cols, collection, filter)? else {
            return Ok(Vec::new());
        };
        let docs = cols.get(collection).map(|c| c.docs.as_slice()).unwrap_or_default();
        Ok(docs.iter().filter(|d| eval_filter(d, filter, &text_fields)).cloned().collect())
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>, SessionError> {
        let mut docs = self.matching(collection, filter)?;
        match (opts.sort.as_deref(), filter.near_clause()) {
            (Some(sort), _) if !sort.is_empty() => docs.sort_by(|a, b| compare_docs(a, b, sort)),
            (_, Some((path, point))) => docs.sort_by(|a, b| {
                let da = distance_to(a, path, point).unwrap_or(f64::MAX);
                let db = distance_to(b, path, point).unwrap_or(f64::MAX);
                da.total_cmp(&db)
            }),
            _ => {}
        }
        let skip = usize::try_from(opts.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = opts.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        Ok(self.matching(collection, filter)?.len() as u64)
    }

    fn estimated_count(&self, collection: &str) -> Result<u64, SessionError> {
        let mut cols = self.collections.write();
        Ok(cols.get_mut(collection).map_or(0, |c| {
            c.sweep_expired((self.clock)());
            c.docs.len() as u64
        }))
    }

    fn insert_one(&self, collection: &str, doc: BsonDocument) -> Result<(), SessionError> {
        self.collections.write().entry(collection.to_string()).or_default().insert(doc)
    }

    fn insert_many(&self, collection: &str, docs: Vec<BsonDocument>) -> Result<(), SessionError> {
        let mut cols = self.collections.write();
        let col = cols.entry(collection.to_string()).or_default();
        // Ordered insert: documents before a failure stay inserted.
        docs.into_iter().try_for_each(|d| col.insert(d))
    }

    fn replace_one(&self, collection: &str, id: &Bson, mut doc: BsonDocument, upsert: bool) -> Result<bool, SessionError> {
        let mut cols = self.collections.write();
        if !upsert && !cols.contains_key(collection) {
            return Ok(false);
        }
        let col = cols.entry(collection.to_string()).or_default();
        match doc.get("_id") {
            Some(existing) if existing != id => {
                return Err(SessionError::InvalidDocumentId(format!(
                    "replacement _id {existing} does not match {id}"
                )));
            }
            Some(_) => {}
            None => {
                let mut with_id = BsonDocument::new();
                with_id.insert("_id", id.clone());
                with_id.extend(doc);
                doc = with_id;
            }
        }
        match col.position(id) {
            Some(i) => {
                col.docs[i] = doc;
                Ok(true)
            }
            None if upsert => {
                col.docs.push(doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        let mut cols = self.collections.write();
        let Some(text_fields) = self.prepare(&mut cols, collection, filter)? else { return Ok(0) };
        let Some(col) = cols.get_mut(collection) else { return Ok(0) };
        match col.docs.iter().position(|d| eval_filter(d, filter, &text_fields)) {
            Some(i) => {
                col.docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, SessionError> {
        let mut cols = self.collections.write();
        let Some(text_fields) = self.prepare(&mut cols, collection, filter)? else { return Ok(0) };
        let Some(col) = cols.get_mut(collection) else { return Ok(0) };
        let before = col.docs.len();
        col.docs.retain(|d| !eval_filter(d, filter, &text_fields));
        Ok((before - col.docs.len()) as u64)
    }

    fn drop_collection(&self, collection: &str) -> Result<(), SessionError> {
        self.collections.write().remove(collection);
        Ok(())
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), SessionError> {
        let mut cols = self.collections.write();
        let col = cols.entry(collection.to_string()).or_default();
        if let Some(existing) = col.indexes.iter().find(|i| i.keys == index.keys) {
            if existing.expire_after != index.expire_after {
                return Err(SessionError::QueryError(format!(
                    "index on {:?} already exists with different options",
                    index.keys
                )));
            }
            return Ok(());
        }
        if index.text_fields().next().is_some() && !col.text_fields().is_empty() {
            return Err(SessionError::QueryError(format!(
                "collection {collection} already has a text index"
            )));
        }
        col.indexes.push(index.clone());
        Ok(())
    }
}
