use bson::Bson;
use serde::{Deserialize, Serialize};

// Safety limits for in-memory evaluation
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_SORT_FIELDS: usize = 32;

/// Mean earth radius used for `$nearSphere` distances, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Cursor options passed to a store alongside a [`Filter`].
///
/// A `limit` of `None` returns every match after `skip`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// A GeoJSON point in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }
}

/// Condition applied to array elements by [`Filter::ElemMatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElemCondition {
    /// Element equals the value (`{$elemMatch: {$eq: v}}`).
    Eq(Bson),
    /// Element is a sub-document whose fields equal the given values.
    Fields(Vec<(String, Bson)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq { path: String, value: Bson },
    Regex { path: String, pattern: String, options: String },
    ElemMatch { path: String, condition: ElemCondition },
    NearSphere { path: String, point: GeoPoint, max_distance: Option<f64> },
    Text { search: String },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Eq { path: path.into(), value: value.into() }
    }

    pub fn regex(path: impl Into<String>, pattern: impl Into<String>, options: &str) -> Self {
        Self::Regex { path: path.into(), pattern: pattern.into(), options: sorted_options(options) }
    }

    /// Case-insensitive "contains" match on a string field; the needle is escaped.
    pub fn contains_ci(path: impl Into<String>, needle: &str) -> Self {
        Self::regex(path, regex::escape(needle), "i")
    }

    /// The `$nearSphere` clause of this filter, if it has one at top level or inside `And`.
    #[must_use]
    pub fn near_clause(&self) -> Option<(&str, GeoPoint)> {
        match self {
            Self::NearSphere { path, point, .. } => Some((path.as_str(), *point)),
            Self::And(fs) => fs.iter().find_map(Self::near_clause),
            _ => None,
        }
    }

    /// True when the filter contains a `$text` clause anywhere.
    #[must_use]
    pub fn has_text(&self) -> bool {
        match self {
            Self::Text { .. } => true,
            Self::And(fs) | Self::Or(fs) => fs.iter().any(Self::has_text),
            _ => false,
        }
    }
}

// The server stores regex options in alphabetical order.
fn sorted_options(options: &str) -> String {
    let mut chars: Vec<char> = options.chars().collect();
    chars.sort_unstable();
    chars.dedup();
    chars.into_iter().collect()
}

/// Kind of a single index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
}

/// Index definition handed to [`crate::store::DocumentStore::create_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub keys: Vec<(String, IndexKind)>,
    pub expire_after: Option<std::time::Duration>,
}

impl IndexSpec {
    /// Names of the fields covered by a text key.
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().filter(|(_, k)| *k == IndexKind::Text).map(|(f, _)| f.as_str())
    }
}
