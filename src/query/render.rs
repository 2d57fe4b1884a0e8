//! Rendering of [`Filter`] trees and sort specs into native query documents.

use bson::{Bson, Document as BsonDocument, doc};

use super::types::{ElemCondition, Filter, IndexKind, IndexSpec, Order, SortSpec};

impl Filter {
    /// Render as a MongoDB query document.
    #[must_use]
    pub fn to_document(&self) -> BsonDocument {
        match self {
            Self::True => BsonDocument::new(),
            Self::And(fs) => logical("$and", fs),
            Self::Or(fs) => logical("$or", fs),
            Self::Eq { path, value } => {
                let mut d = BsonDocument::new();
                d.insert(path.clone(), value.clone());
                d
            }
            Self::Regex { path, pattern, options } => {
                let mut d = BsonDocument::new();
                d.insert(
                    path.clone(),
                    Bson::RegularExpression(bson::Regex {
                        pattern: pattern.clone(),
                        options: options.clone(),
                    }),
                );
                d
            }
            Self::ElemMatch { path, condition } => {
                let inner = match condition {
                    ElemCondition::Eq(v) => doc! { "$eq": v.clone() },
                    ElemCondition::Fields(fields) => {
                        fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                    }
                };
                let mut d = BsonDocument::new();
                d.insert(path.clone(), doc! { "$elemMatch": inner });
                d
            }
            Self::NearSphere { path, point, max_distance } => {
                let mut near = doc! {
                    "$geometry": {
                        "type": "Point",
                        "coordinates": [point.longitude, point.latitude],
                    }
                };
                if let Some(m) = max_distance {
                    near.insert("$maxDistance", *m);
                }
                let mut d = BsonDocument::new();
                d.insert(path.clone(), doc! { "$nearSphere": near });
                d
            }
            Self::Text { search } => doc! { "$text": { "$search": search.clone() } },
        }
    }
}

fn logical(op: &str, fs: &[Filter]) -> BsonDocument {
    match fs {
        [] => BsonDocument::new(),
        [only] => only.to_document(),
        many => {
            let arr: Vec<Bson> = many.iter().map(|f| Bson::Document(f.to_document())).collect();
            let mut d = BsonDocument::new();
            d.insert(op, arr);
            d
        }
    }
}

/// `{field: 1|-1, ...}` in the given order.
#[must_use]
pub fn sort_document(sort: &[SortSpec]) -> BsonDocument {
    sort.iter()
        .map(|s| {
            let dir = match s.order {
                Order::Asc => 1,
                Order::Desc => -1,
            };
            (s.field.clone(), Bson::Int32(dir))
        })
        .collect()
}

impl IndexSpec {
    /// Index key document, e.g. `{Date: 1}` or `{Name: "text"}`.
    #[must_use]
    pub fn keys_document(&self) -> BsonDocument {
        self.keys
            .iter()
            .map(|(field, kind)| {
                let v = match kind {
                    IndexKind::Ascending => Bson::Int32(1),
                    IndexKind::Descending => Bson::Int32(-1),
                    IndexKind::Text => Bson::String("text".into()),
                };
                (field.clone(), v)
            })
            .collect()
    }
}
