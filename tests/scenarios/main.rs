//! Scenario Tests
//!
//! Whole-stack tests through the `esorm` facade, organized by concern:
//! - End to end: the canonical insert/update/delete/erase walk
//! - Invariants: idempotence, monotonic versions, tombstones, uniqueness
//! - Entities: typed projection over the ledger
//! - Bulk: chunked loading through the gateway
//! - Config: file-driven session setup

#[path = "../common/mod.rs"]
mod common;

mod bulk;
mod config;
mod end_to_end;
mod entities;
mod invariants;
