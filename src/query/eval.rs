use bson::{Bson, Document as BsonDocument};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::types::{
    EARTH_RADIUS_METERS, ElemCondition, Filter, GeoPoint, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Order,
    SortSpec,
};
use crate::errors::SessionError;

const REGEX_CACHE_CAPACITY: usize = 256;

// Compiled patterns keyed by option letters, then pattern text.
static REGEX_CACHE: Lazy<Mutex<HashMap<String, HashMap<String, Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static MISSING: Bson = Bson::Null;

/// Evaluate `filter` against `doc`.
///
/// `text_fields` lists the fields covered by the collection's text index; a `$text`
/// clause only ever looks at those.
pub fn eval_filter(doc: &BsonDocument, filter: &Filter, text_fields: &[String]) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f, text_fields)),
        Filter::Or(fs) if fs.is_empty() => true,
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f, text_fields)),
        Filter::Eq { path, value } => {
            let found = lookup(doc, path);
            if matches!(value, Bson::Null) && found.is_empty() {
                return true;
            }
            found.iter().any(|v| fan_out(v).any(|x| bson_eq(x, value)) || bson_eq(v, value))
        }
        Filter::Regex { path, pattern, options } => match cached_regex(pattern, options) {
            Ok(re) => lookup(doc, path)
                .iter()
                .any(|v| fan_out(v).any(|x| matches!(x, Bson::String(s) if re.is_match(s)))),
            Err(_) => false,
        },
        Filter::ElemMatch { path, condition } => lookup(doc, path).iter().any(|v| match v {
            Bson::Array(items) => items.iter().any(|item| elem_matches(item, condition)),
            _ => false,
        }),
        Filter::NearSphere { path, point, max_distance } => lookup(doc, path)
            .iter()
            .filter_map(|v| geo_point_of(v))
            .any(|p| max_distance.is_none_or(|m| haversine_meters(*point, p) <= m)),
        Filter::Text { search } => text_matches(doc, search, text_fields),
    }
}

/// Compile every regex in the filter so bad patterns surface as errors before a scan.
///
/// # Errors
/// Returns [`SessionError::Regex`] for the first pattern that fails to compile.
pub fn validate_filter(filter: &Filter) -> Result<(), SessionError> {
    match filter {
        Filter::And(fs) | Filter::Or(fs) => fs.iter().try_for_each(validate_filter),
        Filter::Regex { pattern, options, .. } => cached_regex(pattern, options).map(|_| ()),
        _ => Ok(()),
    }
}

/// Build a regex honoring the server option letters `i`, `m`, `s` and `x`.
///
/// # Errors
/// Returns [`SessionError::Regex`] if the pattern is invalid, or a query error for an
/// unsupported option letter.
pub fn compile_regex(pattern: &str, options: &str) -> Result<Regex, SessionError> {
    let mut b = RegexBuilder::new(pattern);
    for o in options.chars() {
        match o {
            'i' => b.case_insensitive(true),
            'm' => b.multi_line(true),
            's' => b.dot_matches_new_line(true),
            'x' => b.ignore_whitespace(true),
            'u' => &mut b,
            other => {
                return Err(SessionError::QueryError(format!("unsupported regex option '{other}'")));
            }
        };
    }
    Ok(b.build()?)
}

/// [`compile_regex`] through a process-wide cache, so a scan compiles each pattern once.
///
/// # Errors
/// See [`compile_regex`].
pub fn cached_regex(pattern: &str, options: &str) -> Result<Regex, SessionError> {
    if let Some(re) = REGEX_CACHE.lock().get(options).and_then(|m| m.get(pattern)) {
        return Ok(re.clone());
    }
    let re = compile_regex(pattern, options)?;
    let mut cache = REGEX_CACHE.lock();
    if cache.values().map(HashMap::len).sum::<usize>() >= REGEX_CACHE_CAPACITY {
        cache.clear();
    }
    cache.entry(options.to_string()).or_default().insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn elem_matches(item: &Bson, condition: &ElemCondition) -> bool {
    match condition {
        ElemCondition::Eq(v) => bson_eq(item, v),
        ElemCondition::Fields(fields) => match item {
            Bson::Document(sub) => fields.iter().all(|(k, v)| {
                let found = lookup(sub, k);
                if matches!(v, Bson::Null) && found.is_empty() {
                    return true;
                }
                found.iter().any(|x| bson_eq(x, v) || fan_out(x).any(|y| bson_eq(y, v)))
            }),
            _ => false,
        },
    }
}

// Array values fan out into their elements; scalars yield themselves.
fn fan_out(v: &Bson) -> Box<dyn Iterator<Item = &Bson> + '_> {
    match v {
        Bson::Array(items) => Box::new(items.iter()),
        other => Box::new(std::iter::once(other)),
    }
}

/// Values at a dotted `path`. Arrays met along the way are descended element-wise,
/// the leaf value is returned as stored.
pub fn lookup<'a>(doc: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return Vec::new();
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH {
        return Vec::new();
    }
    let mut out = Vec::new();
    walk(doc, &parts, &mut out);
    out
}

fn walk<'a>(doc: &'a BsonDocument, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else { return };
    let Some(v) = doc.get(*head) else { return };
    if rest.is_empty() {
        out.push(v);
        return;
    }
    match v {
        Bson::Document(d) => walk(d, rest, out),
        Bson::Array(items) => {
            for item in items {
                if let Bson::Document(d) = item {
                    walk(d, rest, out);
                }
            }
        }
        _ => {}
    }
}

fn first_at<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    lookup(doc, path).into_iter().next()
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return compare_bson(a, b) == Ordering::Equal;
    }
    a == b
}

/// GeoJSON `Point` document or legacy `[lng, lat]` pair.
#[must_use]
pub fn geo_point_of(v: &Bson) -> Option<GeoPoint> {
    let coords = match v {
        Bson::Document(d) if d.get_str("type").is_ok_and(|t| t == "Point") => {
            d.get_array("coordinates").ok()?
        }
        Bson::Array(a) => a,
        _ => return None,
    };
    match coords.as_slice() {
        [lng, lat, ..] => Some(GeoPoint::new(as_f64(lng)?, as_f64(lat)?)),
        _ => None,
    }
}

/// Great-circle distance between two points, in meters.
#[must_use]
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Distance from `point` to the first geo value at `path`, if any.
#[must_use]
pub fn distance_to(doc: &BsonDocument, path: &str, point: GeoPoint) -> Option<f64> {
    lookup(doc, path).into_iter().find_map(geo_point_of).map(|p| haversine_meters(point, p))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TextQuery {
    terms: Vec<String>,
    phrases: Vec<String>,
    negated: Vec<String>,
}

fn parse_text_search(search: &str) -> TextQuery {
    let mut q = TextQuery::default();
    let mut rest = search;
    while let Some(start) = rest.find('"') {
        let (before, after) = rest.split_at(start);
        push_terms(&mut q, before);
        let after = &after[1..];
        match after.find('"') {
            Some(end) => {
                let phrase = after[..end].trim().to_lowercase();
                if !phrase.is_empty() {
                    q.phrases.push(phrase);
                }
                rest = &after[end + 1..];
            }
            None => {
                rest = after;
                break;
            }
        }
    }
    push_terms(&mut q, rest);
    q
}

fn push_terms(q: &mut TextQuery, s: &str) {
    for raw in s.split_whitespace() {
        let (neg, word) = match raw.strip_prefix('-') {
            Some(w) => (true, w),
            None => (false, raw),
        };
        for token in tokenize(word) {
            if neg { q.negated.push(token) } else { q.terms.push(token) }
        }
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

fn text_matches(doc: &BsonDocument, search: &str, text_fields: &[String]) -> bool {
    let q = parse_text_search(search);
    let mut corpus = String::new();
    for field in text_fields {
        if field == "$**" {
            collect_strings(&Bson::Document(doc.clone()), &mut corpus);
            continue;
        }
        for v in lookup(doc, field) {
            collect_strings(v, &mut corpus);
        }
    }
    let lowered = corpus.to_lowercase();
    let words: Vec<String> = tokenize(&corpus).collect();
    if q.negated.iter().any(|n| words.contains(n)) {
        return false;
    }
    if !q.phrases.is_empty() {
        return q.phrases.iter().all(|p| lowered.contains(p.as_str()));
    }
    q.terms.iter().any(|t| words.contains(t))
}

fn collect_strings(v: &Bson, out: &mut String) {
    match v {
        Bson::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Bson::Array(items) => items.iter().for_each(|i| collect_strings(i, out)),
        Bson::Document(d) => d.values().for_each(|i| collect_strings(i, out)),
        _ => {}
    }
}

pub fn compare_docs(a: &BsonDocument, b: &BsonDocument, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        // missing and null sort together
        let va = first_at(a, &s.field).unwrap_or(&MISSING);
        let vb = first_at(b, &s.field).unwrap_or(&MISSING);
        let ord = compare_bson(va, vb);
        if ord != Ordering::Equal {
            return if matches!(s.order, Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(x: &Bson) -> Option<f64> {
    match x {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    if is_num(a) && is_num(b) {
        let x = as_f64(a).unwrap_or(f64::NAN);
        let y = as_f64(b).unwrap_or(f64::NAN);
        return x.total_cmp(&y);
    }
    match (a, b) {
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::DateTime(x), T::DateTime(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Server sort order across types.
fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 13,
        T::MaxKey => 255,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::QueryOperator;
    use crate::query::builders::{
        array_contains, exact_filter, near_sphere, object_array_contains, search_filter, text,
    };
    use bson::doc;

    fn no_text() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn search_regex_is_case_insensitive_substring() {
        let d = doc! { "Name": "Johnny Cash" };
        assert!(eval_filter(&d, &search_filter([("Name", "john")], QueryOperator::And), &no_text()));
        assert!(!eval_filter(&d, &search_filter([("Name", "^cash")], QueryOperator::And), &no_text()));
    }

    #[test]
    fn search_dot_matches_newline() {
        let d = doc! { "Bio": "line one\nline two" };
        assert!(eval_filter(&d, &search_filter([("Bio", "one.line")], QueryOperator::And), &no_text()));
    }

    #[test]
    fn and_or_semantics() {
        let d = doc! { "Name": "Ann", "Email": "ann@example.com" };
        let and = search_filter([("Name", "ann"), ("Email", "bob")], QueryOperator::And);
        let or = search_filter([("Name", "ann"), ("Email", "bob")], QueryOperator::Or);
        assert!(!eval_filter(&d, &and, &no_text()));
        assert!(eval_filter(&d, &or, &no_text()));
    }

    #[test]
    fn exact_requires_whole_value() {
        let d = doc! { "Name": "Ann" };
        let hit = exact_filter([("Name", Some(Bson::from("ann")))], QueryOperator::And);
        let miss = exact_filter([("Name", Some(Bson::from("an")))], QueryOperator::And);
        assert!(eval_filter(&d, &hit, &no_text()));
        assert!(!eval_filter(&d, &miss, &no_text()));
    }

    #[test]
    fn null_equality_matches_missing_and_null() {
        let f = exact_filter([("Email", None)], QueryOperator::And);
        assert!(eval_filter(&doc! { "Name": "a" }, &f, &no_text()));
        assert!(eval_filter(&doc! { "Email": Bson::Null }, &f, &no_text()));
        assert!(!eval_filter(&doc! { "Email": "x" }, &f, &no_text()));
    }

    #[test]
    fn numeric_equality_across_types() {
        let d = doc! { "n": 3_i64 };
        assert!(eval_filter(&d, &Filter::eq("n", 3.0), &no_text()));
    }

    #[test]
    fn regex_fans_out_over_arrays() {
        let d = doc! { "tags": ["red", "Blue"] };
        assert!(eval_filter(&d, &search_filter([("tags", "blue")], QueryOperator::And), &no_text()));
    }

    #[test]
    fn elem_match_scalar_and_object() {
        let d = doc! {
            "names": ["john", "sarah"],
            "contacts": [{ "name": "john", "id": 1 }, { "name": "matt", "id": 3 }],
        };
        assert!(eval_filter(&d, &array_contains("names", "sarah"), &no_text()));
        assert!(!eval_filter(&d, &array_contains("names", "matt"), &no_text()));
        assert!(eval_filter(&d, &object_array_contains("contacts", "name", "matt"), &no_text()));
        assert!(eval_filter(&d, &object_array_contains("contacts", "id", 1), &no_text()));
        assert!(!eval_filter(&d, &object_array_contains("contacts", "name", "sarah"), &no_text()));
    }

    #[test]
    fn elem_match_requires_array() {
        let d = doc! { "names": "john" };
        assert!(!eval_filter(&d, &array_contains("names", "john"), &no_text()));
    }

    #[test]
    fn dotted_paths_descend_through_arrays() {
        let d = doc! { "Place": { "Geo": { "type": "Point", "coordinates": [0.0, 0.0] } } };
        assert_eq!(lookup(&d, "Place.Geo.type"), vec![&Bson::from("Point")]);
        let d = doc! { "items": [{ "sku": "a" }, { "sku": "b" }] };
        assert_eq!(lookup(&d, "items.sku").len(), 2);
    }

    #[test]
    fn haversine_known_distance() {
        // One degree of longitude on the equator.
        let d = haversine_meters(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111_319.49).abs() < 1.0, "got {d}");
    }

    #[test]
    fn near_sphere_respects_max_distance() {
        let d = doc! { "Geo": { "type": "Point", "coordinates": [34.7818, 32.0853] } };
        assert!(eval_filter(&d, &near_sphere("Geo", 34.7818, 32.0900, 1_000.0), &no_text()));
        assert!(!eval_filter(&d, &near_sphere("Geo", 35.2137, 31.7683, 1_000.0), &no_text()));
    }

    #[test]
    fn near_sphere_accepts_legacy_pairs() {
        let d = doc! { "loc": [10.0, 10.0] };
        assert!(eval_filter(&d, &near_sphere("loc", 10.0, 10.0, 1.0), &no_text()));
    }

    #[test]
    fn text_terms_phrases_and_negation() {
        let fields = vec!["Name".to_string(), "Bio".to_string()];
        let d = doc! { "Name": "Ann Lee", "Bio": "Coffee lover, bakes bread." };
        assert!(eval_filter(&d, &text("tea coffee"), &fields));
        assert!(eval_filter(&d, &text("\"bakes bread\""), &fields));
        assert!(!eval_filter(&d, &text("\"bread bakes\""), &fields));
        assert!(!eval_filter(&d, &text("coffee -bread"), &fields));
        assert!(!eval_filter(&d, &text("-tea"), &fields));
        // fields outside the index are invisible
        assert!(!eval_filter(&d, &text("coffee"), &["Name".to_string()]));
    }

    #[test]
    fn parse_text_search_splits_parts() {
        let q = parse_text_search("alpha \"Beta Gamma\" -delta");
        assert_eq!(q.terms, vec!["alpha"]);
        assert_eq!(q.phrases, vec!["beta gamma"]);
        assert_eq!(q.negated, vec!["delta"]);
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let f = search_filter([("Name", "(")], QueryOperator::And);
        assert!(matches!(validate_filter(&f), Err(SessionError::Regex(_))));
    }

    #[test]
    fn compare_docs_missing_sorts_first() {
        let a = doc! { "x": 1 };
        let b = doc! {};
        assert_eq!(compare_docs(&a, &b, &[SortSpec::asc("x")]), Ordering::Greater);
        assert_eq!(compare_docs(&a, &b, &[SortSpec::desc("x")]), Ordering::Less);
    }

    #[test]
    fn compare_docs_missing_equals_null() {
        let mut docs = vec![
            doc! { "_id": "1" },
            doc! { "_id": "2", "x": Bson::Null },
            doc! { "_id": "3", "x": 0 },
            doc! { "_id": "4", "x": Bson::Null },
        ];
        docs.sort_by(|a, b| compare_docs(a, b, &[SortSpec::asc("x")]));
        let ids: Vec<&str> = docs.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["1", "2", "4", "3"]);
        assert_eq!(compare_docs(&docs[0], &docs[1], &[SortSpec::desc("x")]), Ordering::Equal);
    }

    #[test]
    fn cached_regex_reuses_compiled_pattern() {
        let a = cached_regex("(?:cache-me)", "is").unwrap();
        let b = cached_regex("(?:cache-me)", "is").unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert!(b.is_match("CACHE-ME"));
        assert!(cached_regex("(?:cache-me)", "").unwrap().is_match("cache-me"));
        assert!(!cached_regex("(?:cache-me)", "").unwrap().is_match("CACHE-ME"));
        assert!(cached_regex("(", "i").is_err());
    }
}
