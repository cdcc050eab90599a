//! Document model
//!
//! Both backing collections hold documents of the same shape:
//!
//! ```text
//! {
//!   "meta": {"class": "Person", "last_modified": "...", "deleted": false, "version": 2},
//!   "data": {"uid": "p1", "name": "A"}
//! }
//! ```
//!
//! `data` is the deflated entity content and always carries the `uid`.
//! `meta.version` is only present on version records; it is copied from the
//! store-assigned version of the primary write that produced the record.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the data field holding the entity identifier
pub const UID_FIELD: &str = "uid";

/// Name of the data field indexed as a geo point
pub const COORDINATES_FIELD: &str = "coordinates";

/// Flat data record produced by the entity projection
pub type DataRecord = Map<String, Value>;

/// Bookkeeping attached to every stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Entity class that produced the document
    #[serde(rename = "class")]
    pub class_name: String,
    /// Wall-clock time of the write
    pub last_modified: DateTime<Utc>,
    /// Logical tombstone flag
    #[serde(default)]
    pub deleted: bool,
    /// Store-assigned version, present on version records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Meta {
    /// Fresh metadata for a live write
    pub fn new(class_name: impl Into<String>) -> Self {
        Meta {
            class_name: class_name.into(),
            last_modified: Utc::now(),
            deleted: false,
            version: None,
        }
    }
}

/// A document as stored in either collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Bookkeeping
    pub meta: Meta,
    /// Entity content
    pub data: DataRecord,
}

impl Document {
    /// Create a live document for `class_name` with the given content
    pub fn new(class_name: impl Into<String>, data: DataRecord) -> Self {
        Document {
            meta: Meta::new(class_name),
            data,
        }
    }

    /// The `data.uid` value, if present and a string
    pub fn uid(&self) -> Option<&str> {
        self.data.get(UID_FIELD).and_then(Value::as_str)
    }

    /// The `data.uid` value, or `MissingUid`
    pub fn require_uid(&self) -> Result<&str> {
        match self.uid() {
            Some(uid) if !uid.is_empty() => Ok(uid),
            _ => Err(Error::MissingUid),
        }
    }

    /// Copy of this document carrying `meta.version = version`
    pub fn stamped(&self, version: u64) -> Document {
        let mut copy = self.clone();
        copy.meta.version = Some(version);
        copy
    }

    /// Flip the tombstone flag, keeping everything else
    pub fn into_tombstone(mut self) -> Document {
        self.meta.deleted = true;
        self
    }

    /// Whether this document is a tombstone
    pub fn is_deleted(&self) -> bool {
        self.meta.deleted
    }

    /// The stamped version, if any
    pub fn version(&self) -> Option<u64> {
        self.meta.version
    }

    /// Render as a JSON value
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Geographic coordinate, stored as `{"lat": .., "lon": ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GeoPoint {
    /// Mean earth radius used for distance calculations
    pub const EARTH_RADIUS_KM: f64 = 6371.0088;

    /// Create a point
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// Whether latitude and longitude are inside their valid ranges
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }

    /// Parse any of the geo point encodings the store accepts:
    /// `{"lat": .., "lon": ..}`, `[lon, lat]` or `"lat,lon"`.
    pub fn from_json(value: &Value) -> Option<GeoPoint> {
        match value {
            Value::Object(obj) => {
                let lat = obj.get("lat")?.as_f64()?;
                let lon = obj.get("lon")?.as_f64()?;
                Some(GeoPoint { lat, lon })
            }
            Value::Array(items) if items.len() == 2 => {
                let lon = items[0].as_f64()?;
                let lat = items[1].as_f64()?;
                Some(GeoPoint { lat, lon })
            }
            Value::String(s) => {
                let (lat, lon) = s.split_once(',')?;
                Some(GeoPoint {
                    lat: lat.trim().parse().ok()?,
                    lon: lon.trim().parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

impl From<GeoPoint> for Value {
    fn from(p: GeoPoint) -> Self {
        serde_json::json!({"lat": p.lat, "lon": p.lon})
    }
}
