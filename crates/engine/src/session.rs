//! Session: one configured ledger over one backend
//!
//! A session owns nothing global. Two sessions over two stores are fully
//! independent; clones of one session share the gateway's mapping cache.

use crate::config::EsormConfig;
use crate::ledger::{LedgerConfig, VersionLedger};
use crate::visibility::VisibilityFence;
use esorm_core::{DocumentStore, Result};
use esorm_storage::{Gateway, HttpStore, InMemoryStore};
use std::sync::Arc;
use tracing::info;

/// Configured gateway, ledger and visibility fence
#[derive(Debug, Clone)]
pub struct Session {
    config: EsormConfig,
    ledger: VersionLedger,
    fence: VisibilityFence,
}

impl Session {
    /// Connect to the Elasticsearch endpoint described by `config`
    ///
    /// No request is sent until the first operation.
    pub fn connect(config: &EsormConfig) -> Result<Self> {
        config.validate()?;
        let store = HttpStore::new(config.http_store_config())?;
        info!(target: "esorm::session", url = %config.base_url(), "Connecting");
        Self::with_store(Arc::new(store), config.clone())
    }

    /// Session over a fresh [`InMemoryStore`] with default settings
    pub fn in_memory() -> Result<Self> {
        Self::with_store(Arc::new(InMemoryStore::new()), EsormConfig::default())
    }

    /// Session over any backend
    pub fn with_store(store: Arc<dyn DocumentStore>, config: EsormConfig) -> Result<Self> {
        config.validate()?;
        let gateway = Gateway::new(store).with_bulk_chunk_size(config.bulk_chunk_size)?;
        let ledger = VersionLedger::new(
            gateway,
            LedgerConfig {
                primary_index: config.primary_index.clone(),
                version_index: config.version_index.clone(),
                max_write_attempts: config.max_write_attempts,
            },
        )?;
        let fence = VisibilityFence::new(config.visibility);
        Ok(Session {
            config,
            ledger,
            fence,
        })
    }

    /// The version ledger
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// The gateway under the ledger
    pub fn gateway(&self) -> &Gateway {
        self.ledger.gateway()
    }

    /// The read-after-write fence
    pub fn fence(&self) -> &VisibilityFence {
        &self.fence
    }

    /// Settings this session was built from
    pub fn config(&self) -> &EsormConfig {
        &self.config
    }
}
