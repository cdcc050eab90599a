//! Entities: the lifecycle surface for one schema
//!
//! Each call maps onto one ledger operation keyed by the entity's uid.
//! Writes wait on the session's visibility fence, so a search issued right
//! after `save` or `delete` returns observes it.

use crate::codec::FieldValue;
use crate::entity::Entity;
use crate::schema::Schema;
use esorm_core::{
    Criterion, DeleteByQueryResponse, Error, Hit, QueryBuilder, Result, UID_FIELD,
};
use esorm_engine::{DeleteReport, InsertOutcome, Session, VersionLedger, VisibilityFence};
use std::sync::Arc;
use tracing::debug;

const CLASS_KEY: &str = "_class";
const DELETED_KEY: &str = "_deleted";

/// Repository of one entity class over a session
#[derive(Debug, Clone)]
pub struct Entities {
    schema: Arc<Schema>,
    ledger: VersionLedger,
    fence: VisibilityFence,
}

impl Entities {
    /// Repository for `schema` using the session's ledger and fence
    pub fn new(session: &Session, schema: Arc<Schema>) -> Self {
        Entities {
            schema,
            ledger: session.ledger().clone(),
            fence: *session.fence(),
        }
    }

    /// The schema entities are checked against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Build a new entity of this class
    pub fn create<K, I>(&self, values: I) -> Result<Entity>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        Entity::new(&self.schema, values)
    }

    fn check_class(&self, entity: &Entity) -> Result<()> {
        if entity.class_name() == self.schema.class_name() {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{} entity passed to {} repository",
                entity.class_name(),
                self.schema.class_name()
            )))
        }
    }

    /// Persist the entity, returning whether anything was written
    ///
    /// Identical content is a no-op (`false`). After a write, blocks until
    /// the new primary document and version record are searchable.
    pub fn save(&self, entity: &Entity) -> Result<bool> {
        Ok(self.save_outcome(entity)?.was_written())
    }

    /// [`save`](Self::save), returning the full ledger outcome
    pub fn save_outcome(&self, entity: &Entity) -> Result<InsertOutcome> {
        self.check_class(entity)?;
        let document = entity.to_document()?;
        let outcome = self.ledger.insert(&document)?;

        if let Some(write) = outcome.write() {
            let uid = entity.uid();
            let waited = self.fence.wait_until(
                &self.ledger.config().version_index,
                uid,
                || self.ledger.is_searchable(uid, write),
            )?;
            debug!(target: "esorm::entity", uid, version = write.version, ?waited, "Saved");
        }
        Ok(outcome)
    }

    /// Tombstone the entity and its history
    ///
    /// Blocks until the tombstone is searchable.
    pub fn delete(&self, entity: &Entity) -> Result<DeleteReport> {
        self.check_class(entity)?;
        let uid = entity.uid();
        let report = self.ledger.delete(uid)?;

        let query = QueryBuilder::must_match([
            (DELETED_KEY, Criterion::equals(true)),
            (UID_FIELD, Criterion::equals(uid)),
        ])?;
        let primary = &self.ledger.config().primary_index;
        self.fence.wait_until(primary, uid, || {
            Ok(self
                .ledger
                .gateway()
                .search(primary, &query)?
                .iter()
                .any(|hit| hit.id == uid))
        })?;
        Ok(report)
    }

    /// Version numbers recorded for the entity, in store order
    pub fn get_all_versions(&self, entity: &Entity) -> Result<Vec<u64>> {
        self.ledger.get_all_versions(entity.uid())
    }

    /// The entity as it was at `version`, if that version is recorded
    pub fn load_version(&self, entity: &Entity, version: u64) -> Result<Option<Entity>> {
        self.ledger
            .get_doc_by_version(entity.uid(), version)?
            .map(|hit| self.inflate(&hit))
            .transpose()
    }

    /// Physically erase one recorded version
    pub fn delete_version(&self, entity: &Entity, version: u64) -> Result<DeleteByQueryResponse> {
        self.ledger.delete_version(entity.uid(), version)
    }

    /// The live entity stored under `uid`; tombstones read as absent
    pub fn get(&self, uid: &str) -> Result<Option<Entity>> {
        match self.ledger.get_current(uid)? {
            Some(hit)
                if !hit.source.is_deleted()
                    && hit.source.meta.class_name == self.schema.class_name() =>
            {
                self.inflate(&hit).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Live entities of this class matching every criterion
    ///
    /// Keys follow the predicate convention: `_name` targets `meta.name`,
    /// `geo_near` takes a [`Criterion::GeoNear`], anything else must be a
    /// declared field.
    pub fn find<K, I>(&self, criteria: I) -> Result<Vec<Entity>>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Criterion)>,
    {
        let mut fields: Vec<(String, Criterion)> = vec![
            (CLASS_KEY.to_string(), Criterion::equals(self.schema.class_name())),
            (DELETED_KEY.to_string(), Criterion::equals(false)),
        ];
        for (key, criterion) in criteria {
            let key = key.into();
            let is_data_field = !key.starts_with('_') && key != esorm_core::GEO_NEAR_FIELD;
            if is_data_field {
                self.schema.codec(&key)?;
            }
            fields.push((key, criterion));
        }

        let query = QueryBuilder::must_match(fields)?;
        let hits = self
            .ledger
            .gateway()
            .search(&self.ledger.config().primary_index, &query)?;

        // Text matching in the store may be looser than equality
        hits.iter()
            .filter(|hit| {
                !hit.source.is_deleted() && hit.source.meta.class_name == self.schema.class_name()
            })
            .map(|hit| self.inflate(hit))
            .collect()
    }

    /// [`find`](Self::find) on one field, deflating `value` through its codec
    pub fn find_by(&self, field: &str, value: impl Into<FieldValue>) -> Result<Vec<Entity>> {
        let value = value.into();
        let raw = self.schema.codec(field)?.deflate(field, &value)?;
        self.find([(field, Criterion::Equals(raw))])
    }

    fn inflate(&self, hit: &Hit) -> Result<Entity> {
        Entity::from_data(&self.schema, &hit.source.data)
    }
}
