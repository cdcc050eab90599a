//! Typed entities
//!
//! An [`Entity`] is a set of typed field values checked against its
//! [`Schema`]. It converts to the flat `data` record the ledger persists
//! (`to_data`) and is rebuilt from one (`from_data`).

use crate::codec::FieldValue;
use crate::schema::Schema;
use esorm_core::{DataRecord, Document, Error, Result, UID_FIELD};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Field values of one entity instance
#[derive(Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    values: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Build an entity from field values
    ///
    /// Undeclared names fail with `UnknownField`; every value is validated
    /// by its codec. Missing fields take their codec default when it has one
    /// (a `UidCodec` uid defaults to a fresh UUID). The result always has a
    /// uid, or construction fails with `MissingUid`.
    pub fn new<K, I>(schema: &Arc<Schema>, values: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        let mut checked = BTreeMap::new();
        for (field, value) in values {
            let field = field.into();
            schema.codec(&field)?.validate(&field, &value)?;
            checked.insert(field, value);
        }

        for (field, codec) in schema.fields() {
            if !checked.contains_key(field) {
                if let Some(default) = codec.default_value() {
                    checked.insert(field.to_string(), default);
                }
            }
        }

        let entity = Entity {
            schema: Arc::clone(schema),
            values: checked,
        };
        entity.require_uid()?;
        Ok(entity)
    }

    /// Rebuild an entity from a stored `data` record
    ///
    /// Values are inflated by their codecs but not re-validated, so records
    /// written before an allowed-values change still load.
    pub fn from_data(schema: &Arc<Schema>, data: &DataRecord) -> Result<Self> {
        let values = data
            .iter()
            .map(|(field, raw)| {
                let value = schema.codec(field)?.inflate(field, raw)?;
                Ok((field.clone(), value))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let entity = Entity {
            schema: Arc::clone(schema),
            values,
        };
        entity.require_uid()?;
        Ok(entity)
    }

    fn require_uid(&self) -> Result<&str> {
        match self.values.get(UID_FIELD).and_then(FieldValue::as_str) {
            Some(uid) if !uid.is_empty() => Ok(uid),
            _ => Err(Error::MissingUid),
        }
    }

    /// The entity identifier
    pub fn uid(&self) -> &str {
        self.require_uid().unwrap_or_default()
    }

    /// The entity's schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The schema's class name
    pub fn class_name(&self) -> &str {
        self.schema.class_name()
    }

    /// Value of a declared field, `None` when unset
    pub fn get(&self, field: &str) -> Result<Option<&FieldValue>> {
        self.schema.codec(field)?;
        Ok(self.values.get(field))
    }

    /// Replace a field's value after validating it
    ///
    /// The uid is immutable once assigned.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        self.schema.codec(field)?.validate(field, &value)?;
        if field == UID_FIELD && self.values.get(UID_FIELD) != Some(&value) {
            return Err(Error::invalid_argument(format!(
                "uid of {} {} cannot be changed",
                self.class_name(),
                self.uid()
            )));
        }
        self.values.insert(field.to_string(), value);
        Ok(())
    }

    /// Clear a field; the uid cannot be cleared
    pub fn unset(&mut self, field: &str) -> Result<Option<FieldValue>> {
        self.schema.codec(field)?;
        if field == UID_FIELD {
            return Err(Error::MissingUid);
        }
        Ok(self.values.remove(field))
    }

    /// Set fields in name order
    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deflate every set field into a flat `data` record
    pub fn to_data(&self) -> Result<DataRecord> {
        let mut data = DataRecord::new();
        for (field, value) in &self.values {
            let raw = self.schema.codec(field)?.deflate(field, value)?;
            data.insert(field.clone(), raw);
        }
        Ok(data)
    }

    /// A live document for this entity, stamped `last_modified = now`
    pub fn to_document(&self) -> Result<Document> {
        Ok(Document::new(self.class_name(), self.to_data()?))
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.class_name() == other.class_name() && self.values == other.values
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("class", &self.class_name())
            .field("values", &self.values)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.class_name())?;
        for (field, value) in &self.values {
            write!(f, " {}={}", field, value)?;
        }
        f.write_str(">")
    }
}
