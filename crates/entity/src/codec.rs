//! Field codecs
//!
//! A codec owns one field's type: it checks typed values, converts them to
//! the plain JSON stored under `data` (deflate) and back (inflate). Codecs
//! are resolved once, when a [`Schema`](crate::Schema) is built; entities
//! never dispatch on field names at runtime.
//!
//! | codec            | typed value            | stored as                  |
//! |------------------|------------------------|----------------------------|
//! | `StringCodec`    | `FieldValue::Str`      | string                     |
//! | `IntegerCodec`   | `FieldValue::Int`      | integer                    |
//! | `FloatCodec`     | `FieldValue::Float`    | number                     |
//! | `BooleanCodec`   | `FieldValue::Bool`     | boolean                    |
//! | `UidCodec`       | `FieldValue::Str`      | string (UUID v4 default)   |
//! | `DateTimeCodec`  | `FieldValue::DateTime` | epoch seconds (float, UTC) |
//! | `GeoPointCodec`  | `FieldValue::Geo`      | `{"lat": .., "lon": ..}`   |
//! | `JsonCodec`      | `FieldValue::Json`     | object                     |
//! | `ArrayCodec`     | `FieldValue::Array`    | array                      |

use chrono::{DateTime, Utc};
use esorm_core::{DataRecord, Error, GeoPoint, Result};
use serde_json::{Number, Value};
use std::fmt;
use std::ops::RangeInclusive;
use uuid::Uuid;

/// Type tag of a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// UTF-8 string
    String,
    /// 64-bit signed integer
    Integer,
    /// Finite 64-bit float
    Float,
    /// Boolean
    Boolean,
    /// Entity identifier
    Uid,
    /// UTC timestamp
    DateTime,
    /// Geographic coordinate
    GeoPoint,
    /// Free-form JSON object
    Json,
    /// Homogeneous list
    Array,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Uid => "uid",
            FieldKind::DateTime => "datetime",
            FieldKind::GeoPoint => "geo point",
            FieldKind::Json => "json object",
            FieldKind::Array => "array",
        };
        f.write_str(name)
    }
}

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// String (also used for uids)
    Str(String),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// UTC timestamp
    DateTime(DateTime<Utc>),
    /// Geographic coordinate
    Geo(GeoPoint),
    /// JSON object
    Json(DataRecord),
    /// List of values
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Str(_) => "string",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "boolean",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Geo(_) => "geo point",
            FieldValue::Json(_) => "json object",
            FieldValue::Array(_) => "array",
        }
    }

    /// The string, if this is `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is `Int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float, if this is `Float`
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean, if this is `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The timestamp, if this is `DateTime`
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// The coordinate, if this is `Geo`
    pub fn as_geo(&self) -> Option<&GeoPoint> {
        match self {
            FieldValue::Geo(p) => Some(p),
            _ => None,
        }
    }

    /// The object, if this is `Json`
    pub fn as_json(&self) -> Option<&DataRecord> {
        match self {
            FieldValue::Json(m) => Some(m),
            _ => None,
        }
    }

    /// The elements, if this is `Array`
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{:?}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Geo(p) => write!(f, "({}, {})", p.lat, p.lon),
            FieldValue::Json(m) => write!(f, "{}", Value::Object(m.clone())),
            FieldValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FieldValue::DateTime(dt)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(p: GeoPoint) -> Self {
        FieldValue::Geo(p)
    }
}

impl From<DataRecord> for FieldValue {
    fn from(m: DataRecord) -> Self {
        FieldValue::Json(m)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::Array(items.into_iter().map(Into::into).collect())
    }
}

fn wrong_type(field: &str, expected: FieldKind, found: &FieldValue) -> Error {
    Error::InvalidType {
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

fn wrong_json(field: &str, expected: FieldKind, found: &Value) -> Error {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    Error::InvalidType {
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn not_allowed(field: &str, value: &FieldValue) -> Error {
    Error::ValueNotAllowed {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// One field's type: validation plus conversion to and from stored JSON
pub trait FieldCodec: Send + Sync + fmt::Debug {
    /// Type tag
    fn kind(&self) -> FieldKind;

    /// Typed value to stored JSON; fails on a type mismatch
    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value>;

    /// Stored JSON to typed value; fails on a type mismatch
    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue>;

    /// Type check plus any value constraints (allowed values, ranges)
    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        self.deflate(field, value).map(|_| ())
    }

    /// Value filled in when an entity is built without this field
    fn default_value(&self) -> Option<FieldValue> {
        None
    }
}

// ============================================================================
// Scalars
// ============================================================================

/// String field, optionally restricted to a set of allowed values
#[derive(Debug, Clone, Default)]
pub struct StringCodec {
    allowed: Vec<String>,
    default: Option<String>,
}

impl StringCodec {
    /// Unrestricted string field
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict values to `allowed` (the default, if any, is always allowed)
    pub fn with_allowed<I, S>(mut self, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = allowed.into_iter().map(Into::into).collect();
        self
    }

    /// Default filled in for entities built without this field
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

impl FieldCodec for StringCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::String
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Str(s) => Ok(Value::String(s.clone())),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        match value {
            Value::String(s) => Ok(FieldValue::Str(s.clone())),
            other => Err(wrong_json(field, self.kind(), other)),
        }
    }

    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        let s = value.as_str().ok_or_else(|| wrong_type(field, self.kind(), value))?;
        if self.allowed.is_empty()
            || self.allowed.iter().any(|a| a == s)
            || self.default.as_deref() == Some(s)
        {
            Ok(())
        } else {
            Err(not_allowed(field, value))
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        self.default.clone().map(FieldValue::Str)
    }
}

/// Integer field, optionally restricted to values and inclusive ranges
#[derive(Debug, Clone, Default)]
pub struct IntegerCodec {
    allowed: Vec<i64>,
    ranges: Vec<RangeInclusive<i64>>,
    default: Option<i64>,
}

impl IntegerCodec {
    /// Unrestricted integer field
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow these exact values
    pub fn with_allowed(mut self, allowed: impl IntoIterator<Item = i64>) -> Self {
        self.allowed.extend(allowed);
        self
    }

    /// Allow every value in `range`
    pub fn with_range(mut self, range: RangeInclusive<i64>) -> Self {
        self.ranges.push(range);
        self
    }

    /// Default filled in for entities built without this field
    pub fn with_default(mut self, default: i64) -> Self {
        self.default = Some(default);
        self
    }

    fn permits(&self, i: i64) -> bool {
        (self.allowed.is_empty() && self.ranges.is_empty())
            || self.allowed.contains(&i)
            || self.ranges.iter().any(|r| r.contains(&i))
            || self.default == Some(i)
    }
}

impl FieldCodec for IntegerCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Integer
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Int(i) => Ok(Value::from(*i)),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        value
            .as_i64()
            .map(FieldValue::Int)
            .ok_or_else(|| wrong_json(field, self.kind(), value))
    }

    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        let i = value.as_int().ok_or_else(|| wrong_type(field, self.kind(), value))?;
        if self.permits(i) {
            Ok(())
        } else {
            Err(not_allowed(field, value))
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        self.default.map(FieldValue::Int)
    }
}

/// Finite float field, optionally restricted to inclusive ranges
#[derive(Debug, Clone, Default)]
pub struct FloatCodec {
    ranges: Vec<RangeInclusive<f64>>,
    default: Option<f64>,
}

impl FloatCodec {
    /// Unrestricted float field
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow every value in `range`
    pub fn with_range(mut self, range: RangeInclusive<f64>) -> Self {
        self.ranges.push(range);
        self
    }

    /// Default filled in for entities built without this field
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }
}

impl FieldCodec for FloatCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Float
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            // Non-finite floats have no JSON encoding
            FieldValue::Float(x) => Number::from_f64(*x).map(Value::Number).ok_or_else(|| {
                Error::InvalidType {
                    field: field.to_string(),
                    expected: "finite float".to_string(),
                    found: x.to_string(),
                }
            }),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        value
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| wrong_json(field, self.kind(), value))
    }

    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        self.deflate(field, value)?;
        let x = value.as_float().unwrap_or_default();
        if self.ranges.is_empty()
            || self.ranges.iter().any(|r| r.contains(&x))
            || self.default == Some(x)
        {
            Ok(())
        } else {
            Err(not_allowed(field, value))
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        self.default.map(FieldValue::Float)
    }
}

/// Boolean field
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl FieldCodec for BooleanCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Boolean
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        value
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| wrong_json(field, self.kind(), value))
    }
}

/// Entity identifier: a non-empty string, a fresh UUID v4 by default
#[derive(Debug, Clone, Copy, Default)]
pub struct UidCodec;

impl FieldCodec for UidCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Uid
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Str(s) if !s.is_empty() => Ok(Value::String(s.clone())),
            FieldValue::Str(_) => Err(Error::invalid_argument(format!(
                "field \"{}\" must not be empty",
                field
            ))),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(FieldValue::Str(s.clone())),
            other => Err(wrong_json(field, self.kind(), other)),
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Str(Uuid::new_v4().to_string()))
    }
}

/// UTC timestamp stored as float seconds since the Unix epoch
///
/// Precision on the wire is one microsecond.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeCodec {
    default_now: bool,
}

impl DateTimeCodec {
    /// Timestamp field without a default
    pub fn new() -> Self {
        Self::default()
    }

    /// Default to the time the entity is built
    pub fn default_now() -> Self {
        DateTimeCodec { default_now: true }
    }

    /// Seconds since the epoch
    pub fn to_epoch(dt: &DateTime<Utc>) -> f64 {
        dt.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Timestamp for `epoch` seconds, `None` when out of range
    pub fn from_epoch(epoch: f64) -> Option<DateTime<Utc>> {
        if !epoch.is_finite() {
            return None;
        }
        let micros = (epoch * 1_000_000.0).round();
        if micros.abs() >= i64::MAX as f64 {
            return None;
        }
        let micros = micros as i64;
        let secs = micros.div_euclid(1_000_000);
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

impl FieldCodec for DateTimeCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::DateTime
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::DateTime(dt) => Ok(Value::from(Self::to_epoch(dt))),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        value
            .as_f64()
            .and_then(Self::from_epoch)
            .map(FieldValue::DateTime)
            .ok_or_else(|| wrong_json(field, self.kind(), value))
    }

    fn default_value(&self) -> Option<FieldValue> {
        self.default_now.then(|| FieldValue::DateTime(Utc::now()))
    }
}

/// Geographic coordinate stored as `{"lat": .., "lon": ..}`
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPointCodec {
    default: Option<GeoPoint>,
}

impl GeoPointCodec {
    /// Coordinate field without a default
    pub fn new() -> Self {
        Self::default()
    }

    /// Default filled in for entities built without this field
    pub fn with_default(mut self, default: GeoPoint) -> Self {
        self.default = Some(default);
        self
    }
}

impl FieldCodec for GeoPointCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::GeoPoint
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Geo(p) => Ok(Value::from(*p)),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        GeoPoint::from_json(value)
            .map(FieldValue::Geo)
            .ok_or_else(|| wrong_json(field, self.kind(), value))
    }

    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        let p = value.as_geo().ok_or_else(|| wrong_type(field, self.kind(), value))?;
        if p.is_valid() {
            Ok(())
        } else {
            Err(not_allowed(field, value))
        }
    }

    fn default_value(&self) -> Option<FieldValue> {
        self.default.map(FieldValue::Geo)
    }
}

/// Free-form JSON object
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FieldCodec for JsonCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Json
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Json(m) => Ok(Value::Object(m.clone())),
            other => Err(wrong_type(field, self.kind(), other)),
        }
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        match value {
            Value::Object(m) => Ok(FieldValue::Json(m.clone())),
            other => Err(wrong_json(field, self.kind(), other)),
        }
    }
}

// ============================================================================
// Arrays
// ============================================================================

/// List field whose elements all go through one element codec
#[derive(Debug)]
pub struct ArrayCodec {
    element: Box<dyn FieldCodec>,
}

impl ArrayCodec {
    /// Array of `element` values; arrays of arrays are rejected
    pub fn of(element: impl FieldCodec + 'static) -> Result<Self> {
        if element.kind() == FieldKind::Array {
            return Err(Error::invalid_argument("arrays cannot be nested"));
        }
        Ok(ArrayCodec {
            element: Box::new(element),
        })
    }

    /// The element codec
    pub fn element(&self) -> &dyn FieldCodec {
        self.element.as_ref()
    }
}

impl FieldCodec for ArrayCodec {
    fn kind(&self) -> FieldKind {
        FieldKind::Array
    }

    fn deflate(&self, field: &str, value: &FieldValue) -> Result<Value> {
        let items = value
            .as_array()
            .ok_or_else(|| wrong_type(field, self.kind(), value))?;
        items
            .iter()
            .map(|item| self.element.deflate(field, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn inflate(&self, field: &str, value: &Value) -> Result<FieldValue> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.element.inflate(field, item))
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::Array),
            other => Err(wrong_json(field, self.kind(), other)),
        }
    }

    fn validate(&self, field: &str, value: &FieldValue) -> Result<()> {
        let items = value
            .as_array()
            .ok_or_else(|| wrong_type(field, self.kind(), value))?;
        items
            .iter()
            .try_for_each(|item| self.element.validate(field, item))
    }
}
