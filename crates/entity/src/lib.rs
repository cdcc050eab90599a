//! Entity projection for esorm
//!
//! This crate maps typed entities onto the documents the ledger versions:
//! - FieldCodec: per-field type with deflate/inflate/validate and defaults
//! - Schema: static field table of one entity class, requires `uid`
//! - Entity: validated field values, convertible to and from `data`
//! - Entities: save/delete/versions/find for one class over a session
//!
//! # Example
//!
//! ```ignore
//! let person = Schema::builder("Person")
//!     .field("uid", UidCodec)
//!     .field("name", StringCodec::new())
//!     .build()?;
//! let people = Entities::new(&session, person);
//!
//! let mut p = people.create([("name", FieldValue::from("A"))])?;
//! people.save(&p)?;
//! p.set("name", "B")?;
//! people.save(&p)?;
//! assert_eq!(people.get_all_versions(&p)?, vec![1, 2]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod entity;
pub mod repository;
pub mod schema;

pub use codec::{
    ArrayCodec, BooleanCodec, DateTimeCodec, FieldCodec, FieldKind, FieldValue, FloatCodec,
    GeoPointCodec, IntegerCodec, JsonCodec, StringCodec, UidCodec,
};
pub use entity::Entity;
pub use repository::Entities;
pub use schema::{Schema, SchemaBuilder};
