//! VersionLedger: versioned persistence protocol
//!
//! ## Collections
//!
//! - **primary**: one document per `uid`, written at id = `uid`. Holds the
//!   latest content, or a tombstone (`meta.deleted = true`).
//! - **version**: one record per successful content write, at a
//!   store-assigned id. Each record is a copy of the written document with
//!   `meta.version` set to the version the store assigned to the primary
//!   write.
//!
//! ## States per uid
//!
//! ```text
//!            insert                 insert (changed)
//!   ABSENT ─────────▶ LIVE ◀──────────────────────┐
//!                      │  ▲                       │
//!               delete │  │ insert (changed)      │
//!                      ▼  │                       │
//!                    DELETED ─────────────────────┘
//! ```
//!
//! Re-inserting content identical to the stored `data` is a no-op in every
//! state: no primary write, no version record.
//!
//! ## Concurrency
//!
//! The existence check and the primary write are one conditional write:
//! `Create` when the uid is absent, `IfMatch` against the `(seq_no,
//! primary_term)` read when present. A concurrent writer makes the store
//! reject ours with a conflict, and the ledger re-reads and re-decides, up
//! to `max_write_attempts` times. The primary write and the version record
//! write are still two round trips. A failure between them leaves a primary
//! write without a version record; the next insert of the same content
//! finds the gap and appends the missing record.
//!
//! Version numbers are never computed here. They are read back from the
//! primary write acknowledgement.

use esorm_core::{
    Criterion, DeleteByQueryResponse, Document, Error, Hit, IndexResponse, Query, QueryBuilder,
    Result, WriteMode, WriteResult, UID_FIELD,
};
use esorm_storage::Gateway;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Meta field name carrying the stamped version in predicates
const VERSION_KEY: &str = "_version";

/// Collection names and retry budget for a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Collection holding one document per uid
    pub primary_index: String,
    /// Collection holding version records
    pub version_index: String,
    /// Conditional-write attempts per insert
    pub max_write_attempts: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            primary_index: "orm".to_string(),
            version_index: "version".to_string(),
            max_write_attempts: 3,
        }
    }
}

/// Acknowledgements of one versioned write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionWrite {
    /// Version the store assigned to the primary write
    pub version: u64,
    /// Primary collection acknowledgement
    pub primary: IndexResponse,
    /// Version record acknowledgement
    pub record: IndexResponse,
}

/// Result of [`VersionLedger::insert`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum InsertOutcome {
    /// First write for this uid
    Created(VersionWrite),
    /// Content changed; a new version was recorded
    Updated(VersionWrite),
    /// Content identical to the stored document; nothing written
    Unchanged,
}

impl InsertOutcome {
    /// Whether anything was written
    pub fn was_written(&self) -> bool {
        !matches!(self, InsertOutcome::Unchanged)
    }

    /// The write acknowledgements, if anything was written
    pub fn write(&self) -> Option<&VersionWrite> {
        match self {
            InsertOutcome::Created(w) | InsertOutcome::Updated(w) => Some(w),
            InsertOutcome::Unchanged => None,
        }
    }

    /// The new version number, if anything was written
    pub fn version(&self) -> Option<u64> {
        self.write().map(|w| w.version)
    }

    /// Human-readable summary
    pub fn message(&self) -> &'static str {
        match self {
            InsertOutcome::Created(_) => "created",
            InsertOutcome::Updated(_) => "updated",
            InsertOutcome::Unchanged => "Document already exists with same ID and data",
        }
    }
}

/// Result of [`VersionLedger::delete`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Store version of the tombstone write on the primary document
    pub primary_version: u64,
    /// Version records flagged deleted
    pub versions_tombstoned: usize,
}

/// Versioned persistence over a [`Gateway`]
///
/// Holds no per-entity state; every call reads what it needs from the
/// store. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    gateway: Gateway,
    config: LedgerConfig,
}

impl VersionLedger {
    /// Create a ledger over `gateway`
    pub fn new(gateway: Gateway, config: LedgerConfig) -> Result<Self> {
        if config.max_write_attempts == 0 {
            return Err(Error::invalid_argument("max_write_attempts must be at least 1"));
        }
        if config.primary_index == config.version_index {
            return Err(Error::invalid_argument(
                "primary and version collections must differ",
            ));
        }
        Ok(VersionLedger { gateway, config })
    }

    /// The underlying gateway
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Collection names and retry budget
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn uid_query(uid: &str) -> Result<Query> {
        QueryBuilder::must_match([(UID_FIELD, Criterion::equals(uid))])
    }

    fn uid_version_query(uid: &str, version: u64) -> Result<Query> {
        QueryBuilder::must_match([
            (UID_FIELD, Criterion::equals(uid)),
            (VERSION_KEY, Criterion::equals(version)),
        ])
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `document` and record a new version if its content changed
    ///
    /// `document.data.uid` is required. Identical content returns
    /// `Unchanged` without writing.
    pub fn insert(&self, document: &Document) -> Result<InsertOutcome> {
        let uid = document.require_uid()?;
        let primary = &self.config.primary_index;

        for attempt in 1..=self.config.max_write_attempts {
            let current = self.gateway.get_by_id(primary, uid)?;

            let mode = match &current {
                None => WriteMode::Create(uid.to_string()),
                Some(hit) if hit.source.data == document.data => {
                    return self.complete_unchanged(document, hit);
                }
                Some(hit) => WriteMode::IfMatch {
                    id: uid.to_string(),
                    seq_no: hit.seq_no,
                    primary_term: hit.primary_term,
                },
            };

            match self.gateway.insert_one(primary, document, &mode) {
                Ok(ack) => {
                    let write = self.record_version(document, ack)?;
                    info!(
                        target: "esorm::ledger",
                        uid,
                        version = write.version,
                        created = current.is_none(),
                        "Recorded version"
                    );
                    return Ok(match write.primary.result {
                        WriteResult::Created => InsertOutcome::Created(write),
                        WriteResult::Updated => InsertOutcome::Updated(write),
                    });
                }
                Err(e) if e.is_conflict() && attempt < self.config.max_write_attempts => {
                    warn!(
                        target: "esorm::ledger",
                        uid,
                        attempt,
                        "Concurrent write detected, re-reading"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict {
            collection: primary.clone(),
            id: uid.to_string(),
        })
    }

    /// Identical content: nothing to write, unless the primary write that
    /// produced it never got its version record
    ///
    /// A live primary at version `v` without a `(uid, v)` record means an
    /// earlier insert failed between its two writes. The record is appended
    /// now, stamped with the primary's version. Tombstones are skipped since
    /// deletes never record a version.
    fn complete_unchanged(&self, document: &Document, hit: &Hit) -> Result<InsertOutcome> {
        let uid = document.require_uid()?;
        if hit.source.is_deleted() {
            debug!(target: "esorm::ledger", uid, version = hit.version, "Content unchanged");
            return Ok(InsertOutcome::Unchanged);
        }

        // Records have store-assigned ids, so only a search can find them
        self.gateway.refresh(&self.config.version_index)?;
        if self.get_doc_by_version(uid, hit.version)?.is_some() {
            debug!(target: "esorm::ledger", uid, version = hit.version, "Content unchanged");
            return Ok(InsertOutcome::Unchanged);
        }

        warn!(
            target: "esorm::ledger",
            uid,
            version = hit.version,
            "Primary write has no version record, appending it"
        );
        let ack = IndexResponse {
            collection: self.config.primary_index.clone(),
            id: hit.id.clone(),
            version: hit.version,
            result: if hit.version == 1 {
                WriteResult::Created
            } else {
                WriteResult::Updated
            },
            seq_no: hit.seq_no,
            primary_term: hit.primary_term,
        };
        let write = self.record_version(&hit.source, ack)?;
        Ok(match write.primary.result {
            WriteResult::Created => InsertOutcome::Created(write),
            WriteResult::Updated => InsertOutcome::Updated(write),
        })
    }

    /// Stamp the store-assigned version onto a copy and append it as a record
    fn record_version(&self, document: &Document, primary: IndexResponse) -> Result<VersionWrite> {
        let stamped = document.stamped(primary.version);
        let record = self
            .gateway
            .insert_one(&self.config.version_index, &stamped, &WriteMode::Auto)?;
        debug!(
            target: "esorm::ledger",
            uid = stamped.uid().unwrap_or_default(),
            version = primary.version,
            record_id = %record.id,
            "Appended version record"
        );
        Ok(VersionWrite {
            version: primary.version,
            primary,
            record,
        })
    }

    /// Tombstone the entity and every one of its version records
    ///
    /// Nothing is physically removed. Fails with `DocumentNotFound` when no
    /// primary document carries `uid`. If the primary tombstone is written
    /// but the version cascade then fails, the error is
    /// `CascadeIncomplete`; re-running `delete` completes the cascade.
    pub fn delete(&self, uid: &str) -> Result<DeleteReport> {
        let query = Self::uid_query(uid)?;
        let primary = &self.config.primary_index;

        let hit = self
            .gateway
            .search(primary, &query)?
            .into_iter()
            .find(|hit| hit.source.uid() == Some(uid))
            .ok_or_else(|| Error::DocumentNotFound(uid.to_string()))?;

        let tombstone = hit.source.into_tombstone();
        let ack = self
            .gateway
            .insert_one(primary, &tombstone, &WriteMode::Upsert(uid.to_string()))?;

        let versions_tombstoned =
            self.tombstone_versions(uid, &query)
                .map_err(|e| Error::CascadeIncomplete {
                    uid: uid.to_string(),
                    source: Box::new(e),
                })?;

        info!(
            target: "esorm::ledger",
            uid,
            versions = versions_tombstoned,
            "Deleted entity"
        );
        Ok(DeleteReport {
            primary_version: ack.version,
            versions_tombstoned,
        })
    }

    /// Overwrite each version record in place with `meta.deleted = true`
    fn tombstone_versions(&self, uid: &str, query: &Query) -> Result<usize> {
        let version_index = &self.config.version_index;
        let records = self.gateway.search(version_index, query)?;

        let mut count = 0;
        for record in records.into_iter().filter(|r| r.source.uid() == Some(uid)) {
            let id = record.id;
            let tombstone = record.source.into_tombstone();
            self.gateway
                .insert_one(version_index, &tombstone, &WriteMode::Upsert(id))?;
            count += 1;
        }
        Ok(count)
    }

    /// Physically erase the version record(s) for `(uid, version)`
    pub fn delete_version(&self, uid: &str, version: u64) -> Result<DeleteByQueryResponse> {
        let query = Self::uid_version_query(uid, version)?;
        let response = self
            .gateway
            .delete_by_query(&self.config.version_index, &query)?;
        info!(
            target: "esorm::ledger",
            uid,
            version,
            deleted = response.deleted,
            "Erased version"
        );
        Ok(response)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Version numbers recorded for `uid`, in store order
    pub fn get_all_versions(&self, uid: &str) -> Result<Vec<u64>> {
        Ok(self
            .version_records(uid)?
            .iter()
            .filter_map(|hit| hit.source.version())
            .collect())
    }

    /// Full version records for `uid`, ordered by version
    pub fn history(&self, uid: &str) -> Result<Vec<Hit>> {
        let mut records = self.version_records(uid)?;
        records.sort_by_key(|hit| hit.source.version());
        Ok(records)
    }

    fn version_records(&self, uid: &str) -> Result<Vec<Hit>> {
        let query = QueryBuilder::match_field(format!("data.{}", UID_FIELD), uid);
        Ok(self
            .gateway
            .search(&self.config.version_index, &query)?
            .into_iter()
            .filter(|hit| hit.source.uid() == Some(uid))
            .collect())
    }

    /// The version record for `(uid, version)`, if any
    ///
    /// More than one match is a consistency fault (`DuplicateVersion`).
    pub fn get_doc_by_version(&self, uid: &str, version: u64) -> Result<Option<Hit>> {
        let query = Self::uid_version_query(uid, version)?;
        let mut hits: Vec<Hit> = self
            .gateway
            .search(&self.config.version_index, &query)?
            .into_iter()
            .filter(|hit| hit.source.uid() == Some(uid))
            .collect();

        match hits.len() {
            0 => Ok(None),
            1 => Ok(hits.pop()),
            count => Err(Error::DuplicateVersion {
                uid: uid.to_string(),
                version,
                count,
            }),
        }
    }

    /// The primary document for `uid`, tombstoned or not
    pub fn get_current(&self, uid: &str) -> Result<Option<Hit>> {
        self.gateway.get_by_id(&self.config.primary_index, uid)
    }

    /// Whether a write is observable by searches on both collections
    pub fn is_searchable(&self, uid: &str, write: &VersionWrite) -> Result<bool> {
        let primary_visible = self
            .gateway
            .search(&self.config.primary_index, &Self::uid_query(uid)?)?
            .iter()
            .any(|hit| hit.source.uid() == Some(uid) && hit.version >= write.version);
        if !primary_visible {
            return Ok(false);
        }

        let record_visible = self
            .gateway
            .search(
                &self.config.version_index,
                &Self::uid_version_query(uid, write.version)?,
            )?
            .iter()
            .any(|hit| hit.id == write.record.id);
        Ok(record_visible)
    }
}
