//! Versioning engine for esorm
//!
//! This crate builds the persistence protocol on top of the storage layer:
//! - VersionLedger: per-uid insert/delete state machine with an append-only
//!   version trail and conditional primary writes
//! - VisibilityFence: bounded poll-until-searchable after a write
//! - EsormConfig: `esorm.toml` settings with environment overrides
//! - Session: wiring of backend, gateway, ledger and fence
//!
//! The engine is the only component that knows about:
//! - The two-collection layout (primary and version)
//! - Version stamping from store acknowledgements
//! - Tombstone cascades

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ledger;
pub mod session;
pub mod visibility;

pub use config::{EsormConfig, CONFIG_FILE_NAME, ENV_HOST, ENV_PORT};
pub use ledger::{DeleteReport, InsertOutcome, LedgerConfig, VersionLedger, VersionWrite};
pub use session::Session;
pub use visibility::{VisibilityConfig, VisibilityFence};
