//! Entity schemas
//!
//! A schema is the static field-name → codec table for one entity class,
//! built once and shared by every entity of that class.

use crate::codec::{FieldCodec, FieldKind};
use esorm_core::{Error, Result, GEO_NEAR_FIELD, UID_FIELD};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Field table of one entity class
pub struct Schema {
    class_name: String,
    fields: BTreeMap<String, Box<dyn FieldCodec>>,
}

impl Schema {
    /// Start a schema for `class_name`
    pub fn builder(class_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(class_name)
    }

    /// Class name stamped into `meta.class`
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Codec of a declared field, `UnknownField` otherwise
    pub fn codec(&self, field: &str) -> Result<&dyn FieldCodec> {
        self.fields
            .get(field)
            .map(|codec| codec.as_ref())
            .ok_or_else(|| Error::UnknownField {
                field: field.to_string(),
                class_name: self.class_name.clone(),
            })
    }

    /// Whether `field` is declared
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &dyn FieldCodec)> {
        self.fields
            .iter()
            .map(|(name, codec)| (name.as_str(), codec.as_ref()))
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are declared (never true for a built schema)
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Schema");
        s.field("class_name", &self.class_name);
        for (name, codec) in &self.fields {
            s.field(name, &codec.kind());
        }
        s.finish()
    }
}

/// Builder for [`Schema`]
///
/// # Example
///
/// ```ignore
/// let person = Schema::builder("Person")
///     .field("uid", UidCodec)
///     .field("name", StringCodec::new())
///     .field("age", IntegerCodec::new().with_range(0..=150))
///     .build()?;
/// ```
pub struct SchemaBuilder {
    class_name: String,
    fields: BTreeMap<String, Box<dyn FieldCodec>>,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    /// Empty builder for `class_name`
    pub fn new(class_name: impl Into<String>) -> Self {
        SchemaBuilder {
            class_name: class_name.into(),
            fields: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, codec: impl FieldCodec + 'static) -> Self {
        let name = name.into();
        if self.fields.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.fields.insert(name, Box::new(codec));
        }
        self
    }

    /// Check the declarations and freeze the schema
    pub fn build(self) -> Result<Arc<Schema>> {
        if self.class_name.is_empty() {
            return Err(Error::invalid_argument("schema class name must not be empty"));
        }
        if let Some(name) = self.duplicates.first() {
            return Err(Error::invalid_argument(format!(
                "field \"{}\" declared twice in {}",
                name, self.class_name
            )));
        }
        for name in self.fields.keys() {
            if name.is_empty() || name.starts_with('_') || name == GEO_NEAR_FIELD {
                return Err(Error::invalid_argument(format!(
                    "\"{}\" is not a valid field name in {}",
                    name, self.class_name
                )));
            }
        }
        match self.fields.get(UID_FIELD).map(|codec| codec.kind()) {
            Some(FieldKind::Uid) | Some(FieldKind::String) => {}
            Some(kind) => {
                return Err(Error::invalid_argument(format!(
                    "\"{}\" must be a uid or string field in {}, found {}",
                    UID_FIELD, self.class_name, kind
                )))
            }
            None => {
                return Err(Error::invalid_argument(format!(
                    "\"{}\" not found in {}",
                    UID_FIELD, self.class_name
                )))
            }
        }

        Ok(Arc::new(Schema {
            class_name: self.class_name,
            fields: self.fields,
        }))
    }
}
