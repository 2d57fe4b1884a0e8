//! Builders that turn search parameters into [`Filter`] trees.

use bson::Bson;

use super::types::{ElemCondition, Filter, GeoPoint, Order, SortSpec};
use crate::params::QueryOperator;

/// Options used for loose searches: case-insensitive, `.` matches newlines.
pub const SEARCH_REGEX_OPTIONS: &str = "is";
/// Options used for exact searches.
pub const EXACT_REGEX_OPTIONS: &str = "i";

/// Join predicates with the given operator.
#[must_use]
pub fn combine(filters: Vec<Filter>, op: QueryOperator) -> Filter {
    match op {
        QueryOperator::And => Filter::And(filters),
        QueryOperator::Or => Filter::Or(filters),
    }
}

/// Regex search: each `(field, fragment)` pair matches `(?:fragment)` with options `is`.
///
/// Fragments are regular expressions and are not escaped.
pub fn search_filter<K, V>(pairs: impl IntoIterator<Item = (K, V)>, op: QueryOperator) -> Filter
where
    K: Into<String>,
    V: AsRef<str>,
{
    let preds = pairs
        .into_iter()
        .map(|(k, v)| Filter::regex(k, format!("(?:{})", v.as_ref()), SEARCH_REGEX_OPTIONS))
        .collect();
    combine(preds, op)
}

/// Exact search: `None`/null values match null or missing fields, anything else
/// matches the whole string value case-insensitively via `(^value$)`.
pub fn exact_filter<K>(pairs: impl IntoIterator<Item = (K, Option<Bson>)>, op: QueryOperator) -> Filter
where
    K: Into<String>,
{
    let preds = pairs
        .into_iter()
        .map(|(k, v)| match v {
            None | Some(Bson::Null) => Filter::Eq { path: k.into(), value: Bson::Null },
            Some(v) => Filter::regex(k, format!("(^{}$)", bson_display(&v)), EXACT_REGEX_OPTIONS),
        })
        .collect();
    combine(preds, op)
}

/// Match documents whose array field contains `value`.
pub fn array_contains(array: impl Into<String>, value: impl Into<Bson>) -> Filter {
    Filter::ElemMatch { path: array.into(), condition: ElemCondition::Eq(value.into()) }
}

/// Match documents whose array of sub-documents has an element with `key == value`.
pub fn object_array_contains(
    array: impl Into<String>,
    key: impl Into<String>,
    value: impl Into<Bson>,
) -> Filter {
    Filter::ElemMatch {
        path: array.into(),
        condition: ElemCondition::Fields(vec![(key.into(), value.into())]),
    }
}

/// `$nearSphere` around (`longitude`, `latitude`) within `max_meters`.
pub fn near_sphere(path: impl Into<String>, longitude: f64, latitude: f64, max_meters: f64) -> Filter {
    Filter::NearSphere {
        path: path.into(),
        point: GeoPoint::new(longitude, latitude),
        max_distance: Some(max_meters),
    }
}

pub fn text(search: impl Into<String>) -> Filter {
    Filter::Text { search: search.into() }
}

/// Sort specs from `(field, ascending)` pairs, preserving order.
pub fn sort_specs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, bool)>) -> Vec<SortSpec> {
    pairs
        .into_iter()
        .map(|(field, asc)| SortSpec {
            field: field.into(),
            order: if asc { Order::Asc } else { Order::Desc },
        })
        .collect()
}

/// Single descending sort on `order_by`, or none when empty.
#[must_use]
pub fn descending_by(order_by: Option<&str>) -> Option<Vec<SortSpec>> {
    order_by.filter(|f| !f.is_empty()).map(|f| vec![SortSpec::desc(f)])
}

// Value as it would be spliced into a pattern.
fn bson_display(v: &Bson) -> String {
    match v {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}
