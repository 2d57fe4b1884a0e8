// Submodules for separation of concerns
pub mod builders;
mod eval;
mod render;
mod types;

// Public API re-exports
pub use builders::{
    array_contains, combine, descending_by, exact_filter, near_sphere, object_array_contains,
    search_filter, sort_specs, text,
};
pub use eval::{
    cached_regex, compare_bson, compare_docs, compile_regex, distance_to, eval_filter, geo_point_of,
    haversine_meters, lookup, validate_filter,
};
pub use render::sort_document;
pub use types::{
    EARTH_RADIUS_METERS, ElemCondition, Filter, FindOptions, GeoPoint, IndexKind, IndexSpec, Order,
    SortSpec,
};
