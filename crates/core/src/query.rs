//! Query predicates
//!
//! Predicates are "must all match" conjunctions over two namespaces:
//!
//! - **meta fields**: names with a leading underscore (`_version`,
//!   `_deleted`, `_class`) match under `meta.<name without underscore>`
//! - **data fields**: every other name matches under `data.<name>`
//!
//! The literal field name `geo_near` is reserved. Its criterion is a
//! `(origin, distance_km)` pair and becomes a geo-distance filter over
//! `data.coordinates`, conjoined with the equality clauses.
//!
//! A [`Query`] renders to store DSL with [`Query::to_dsl`] and can be
//! evaluated against a JSON source with [`Query::matches`]; the in-memory
//! backend uses the latter.

use crate::document::{GeoPoint, COORDINATES_FIELD};
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};

/// Reserved field name for geo-distance criteria
pub const GEO_NEAR_FIELD: &str = "geo_near";

const META_PREFIX: &str = "meta.";
const DATA_PREFIX: &str = "data.";

// =============================================================================
// Criteria
// =============================================================================

/// What a single named field must satisfy
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Field value equals this value
    Equals(Value),
    /// `data.coordinates` lies within `distance_km` of `origin`
    GeoNear {
        /// Centre of the search circle
        origin: GeoPoint,
        /// Radius in kilometres
        distance_km: f64,
    },
}

impl Criterion {
    /// Equality criterion
    pub fn equals(value: impl Into<Value>) -> Self {
        Criterion::Equals(value.into())
    }

    /// Geo-distance criterion, valid only under the `geo_near` key
    pub fn geo_near(origin: GeoPoint, distance_km: f64) -> Self {
        Criterion::GeoNear {
            origin,
            distance_km,
        }
    }
}

// =============================================================================
// Query
// =============================================================================

/// Equality match on a dotted field path
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    /// Fully qualified path, e.g. `data.uid`
    pub field: String,
    /// Expected value
    pub value: Value,
}

/// Geo-distance filter on a dotted field path
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDistance {
    /// Fully qualified path of the geo point field
    pub field: String,
    /// Centre of the search circle
    pub origin: GeoPoint,
    /// Radius in kilometres
    pub distance_km: f64,
}

/// Structured predicate understood by every store backend
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every document
    MatchAll,
    /// Single flat equality match, no namespace handling
    Match(FieldMatch),
    /// Conjunction of equality clauses and geo filters
    Bool {
        /// Equality clauses, all required
        must: Vec<FieldMatch>,
        /// Geo filters, all required
        filter: Vec<GeoDistance>,
    },
}

impl Query {
    /// Predicate matching every document
    pub fn match_all() -> Self {
        Query::MatchAll
    }

    /// Render as store query DSL
    pub fn to_dsl(&self) -> Value {
        match self {
            Query::MatchAll => json!({"query": {"match_all": {}}}),
            Query::Match(m) => json!({"query": m.to_dsl()}),
            Query::Bool { must, filter } => {
                let must: Vec<Value> = must.iter().map(FieldMatch::to_dsl).collect();

                let mut bool_query = Map::new();
                bool_query.insert("must".to_string(), Value::Array(must));

                let mut filters: Vec<Value> = filter.iter().map(GeoDistance::to_dsl).collect();
                match filters.len() {
                    0 => {}
                    1 => {
                        bool_query.insert("filter".to_string(), filters.remove(0));
                    }
                    _ => {
                        bool_query.insert("filter".to_string(), Value::Array(filters));
                    }
                }

                json!({"query": {"bool": bool_query}})
            }
        }
    }

    /// Evaluate this predicate against a document source
    pub fn matches(&self, source: &Value) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Match(m) => m.matches(source),
            Query::Bool { must, filter } => {
                must.iter().all(|m| m.matches(source)) && filter.iter().all(|g| g.matches(source))
            }
        }
    }
}

impl FieldMatch {
    /// Scalars render as exact `term` clauses; the store mapping keeps
    /// strings unanalyzed, so `person-1` never matches `person-2`.
    /// Objects and arrays have no term form and fall back to `match`.
    fn to_dsl(&self) -> Value {
        let clause = match self.value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => "term",
            _ => "match",
        };
        json!({clause: {self.field.clone(): self.value.clone()}})
    }

    fn matches(&self, source: &Value) -> bool {
        lookup(source, &self.field)
            .into_iter()
            .any(|actual| values_equal(actual, &self.value))
    }
}

impl GeoDistance {
    fn to_dsl(&self) -> Value {
        json!({
            "geo_distance": {
                "distance": format!("{}km", self.distance_km),
                self.field.clone(): Value::from(self.origin),
            }
        })
    }

    fn matches(&self, source: &Value) -> bool {
        lookup(source, &self.field)
            .into_iter()
            .filter_map(GeoPoint::from_json)
            .any(|p| p.distance_km(&self.origin) <= self.distance_km)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds predicates from field-name → criterion pairs
pub struct QueryBuilder;

impl QueryBuilder {
    /// Conjunction of one clause per field
    ///
    /// Meta clauses are emitted before data clauses; within each namespace
    /// input order is kept. `geo_near` must carry a [`Criterion::GeoNear`],
    /// and a `GeoNear` criterion under any other name is rejected.
    pub fn must_match<K, I>(fields: I) -> Result<Query>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Criterion)>,
    {
        let mut meta = Vec::new();
        let mut data = Vec::new();
        let mut filter = Vec::new();

        for (name, criterion) in fields {
            let name = name.into();
            match (name.as_str(), criterion) {
                (GEO_NEAR_FIELD, Criterion::GeoNear {
                    origin,
                    distance_km,
                }) => {
                    if !distance_km.is_finite() || distance_km < 0.0 {
                        return Err(Error::invalid_argument(format!(
                            "geo_near distance must be a non-negative number of km, got {}",
                            distance_km
                        )));
                    }
                    filter.push(GeoDistance {
                        field: format!("{}{}", DATA_PREFIX, COORDINATES_FIELD),
                        origin,
                        distance_km,
                    });
                }
                (GEO_NEAR_FIELD, Criterion::Equals(_)) => {
                    return Err(Error::invalid_argument(
                        "geo_near expects a (coordinates, distance_km) criterion",
                    ));
                }
                (_, Criterion::GeoNear { .. }) => {
                    return Err(Error::invalid_argument(format!(
                        "geo criterion is only valid under \"{}\", got \"{}\"",
                        GEO_NEAR_FIELD, name
                    )));
                }
                (_, Criterion::Equals(value)) => match name.strip_prefix('_') {
                    Some(meta_name) => meta.push(FieldMatch {
                        field: format!("{}{}", META_PREFIX, meta_name),
                        value,
                    }),
                    None => data.push(FieldMatch {
                        field: format!("{}{}", DATA_PREFIX, name),
                        value,
                    }),
                },
            }
        }

        meta.extend(data);
        Ok(Query::Bool { must: meta, filter })
    }

    /// Single flat equality match on a fully qualified path
    pub fn match_field(field: impl Into<String>, value: impl Into<Value>) -> Query {
        Query::Match(FieldMatch {
            field: field.into(),
            value: value.into(),
        })
    }
}

// =============================================================================
// Evaluation helpers
// =============================================================================

/// Collect every value reachable at a dotted path, flattening arrays
fn lookup<'a>(source: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![source];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            collect_field(value, segment, &mut next);
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }

    // Leaf arrays match element-wise, but also as a whole
    let mut out = Vec::with_capacity(current.len());
    for value in current {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn collect_field<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(obj) => {
            if let Some(v) = obj.get(segment) {
                out.push(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        _ => {}
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_must_match_splits_namespaces() {
        let query = QueryBuilder::must_match([
            ("uid", Criterion::equals("p1")),
            ("_version", Criterion::equals(2)),
        ])
        .unwrap();

        assert_eq!(
            query.to_dsl(),
            json!({"query": {"bool": {"must": [
                {"term": {"meta.version": 2}},
                {"term": {"data.uid": "p1"}},
            ]}}})
        );
    }

    #[test]
    fn test_uid_and_version_render_as_exact_terms() {
        let query = QueryBuilder::must_match([
            ("uid", Criterion::equals("person-1")),
            ("_version", Criterion::equals(1)),
            ("_deleted", Criterion::equals(false)),
        ])
        .unwrap();

        assert_eq!(
            query.to_dsl(),
            json!({"query": {"bool": {"must": [
                {"term": {"meta.version": 1}},
                {"term": {"meta.deleted": false}},
                {"term": {"data.uid": "person-1"}},
            ]}}})
        );
    }

    #[test]
    fn test_structured_values_fall_back_to_match() {
        let query = QueryBuilder::must_match([("extra", Criterion::equals(json!({"team": 7})))])
            .unwrap();
        assert_eq!(
            query.to_dsl(),
            json!({"query": {"bool": {"must": [{"match": {"data.extra": {"team": 7}}}]}}})
        );
    }

    #[test]
    fn test_geo_near_becomes_filter() {
        let query = QueryBuilder::must_match([
            ("name", Criterion::equals("cafe")),
            (
                GEO_NEAR_FIELD,
                Criterion::geo_near(GeoPoint::new(52.5, 13.4), 10.0),
            ),
        ])
        .unwrap();

        assert_eq!(
            query.to_dsl(),
            json!({"query": {"bool": {
                "must": [{"term": {"data.name": "cafe"}}],
                "filter": {"geo_distance": {
                    "distance": "10km",
                    "data.coordinates": {"lat": 52.5, "lon": 13.4},
                }},
            }}})
        );
    }

    #[test]
    fn test_geo_criterion_under_wrong_key_rejected() {
        let err = QueryBuilder::must_match([(
            "location",
            Criterion::geo_near(GeoPoint::new(0.0, 0.0), 1.0),
        )])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = QueryBuilder::must_match([(GEO_NEAR_FIELD, Criterion::equals("x"))]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = QueryBuilder::must_match([(
            GEO_NEAR_FIELD,
            Criterion::geo_near(GeoPoint::new(0.0, 0.0), -1.0),
        )])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_match_field_is_flat() {
        let query = QueryBuilder::match_field("data.uid", "p1");
        assert_eq!(query.to_dsl(), json!({"query": {"term": {"data.uid": "p1"}}}));
    }

    #[test]
    fn test_matches_nested_paths_and_numbers() {
        let source = json!({
            "meta": {"version": 2, "deleted": false},
            "data": {"uid": "p1", "tags": ["a", "b"], "score": 1.0}
        });

        let query = QueryBuilder::must_match([
            ("uid", Criterion::equals("p1")),
            ("_version", Criterion::equals(2)),
            ("_deleted", Criterion::equals(false)),
        ])
        .unwrap();
        assert!(query.matches(&source));

        assert!(QueryBuilder::match_field("data.tags", "b").matches(&source));
        assert!(QueryBuilder::match_field("data.score", 1).matches(&source));
        assert!(!QueryBuilder::match_field("data.uid", "p2").matches(&source));
        assert!(!QueryBuilder::match_field("data.missing", "p1").matches(&source));
        assert!(Query::match_all().matches(&source));
    }

    #[test]
    fn test_matches_geo_distance() {
        let source = json!({"data": {"coordinates": {"lat": 52.52, "lon": 13.405}}});
        let near = QueryBuilder::must_match([(
            GEO_NEAR_FIELD,
            Criterion::geo_near(GeoPoint::new(52.50, 13.40), 5.0),
        )])
        .unwrap();
        let far = QueryBuilder::must_match([(
            GEO_NEAR_FIELD,
            Criterion::geo_near(GeoPoint::new(48.8566, 2.3522), 5.0),
        )])
        .unwrap();

        assert!(near.matches(&source));
        assert!(!far.matches(&source));
        assert!(!near.matches(&json!({"data": {}})));
    }

    proptest! {
        #[test]
        fn prop_every_field_gets_exactly_one_clause(
            names in proptest::collection::btree_set("_?[a-z]{1,8}", 0..8)
        ) {
            let names: Vec<String> = names.into_iter().filter(|n| n != GEO_NEAR_FIELD).collect();
            let query = QueryBuilder::must_match(
                names.iter().map(|n| (n.clone(), Criterion::equals(1)))
            ).unwrap();

            let Query::Bool { must, filter } = query else {
                panic!("must_match always builds a bool query");
            };
            prop_assert!(filter.is_empty());
            prop_assert_eq!(must.len(), names.len());

            let meta_count = names.iter().filter(|n| n.starts_with('_')).count();
            for (i, clause) in must.iter().enumerate() {
                if i < meta_count {
                    prop_assert!(clause.field.starts_with("meta."));
                } else {
                    prop_assert!(clause.field.starts_with("data."));
                }
            }
        }
    }
}
