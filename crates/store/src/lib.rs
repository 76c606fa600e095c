//! # Codefacts Store
//!
//! Persists one normalized [`Snapshot`](codefacts_facts::Snapshot) in SQLite and
//! serves read-only lookups over it.
//!
//! - [`KnowledgeStore::replace_snapshot`] swaps the whole snapshot inside one
//!   `IMMEDIATE` transaction and bumps the generation counter.
//! - [`KnowledgeStore::read`] hands out a [`ReadSession`] pinned to the snapshot
//!   committed at that moment (WAL snapshot isolation).
//! - Every edge table is indexed on both endpoints, so neighbor queries in either
//!   direction are index lookups.

mod error;
mod records;
mod schema;
mod session;
mod sql;
mod store;

pub use error::{Result, StoreError};
pub use records::{
    CallCount, CallSite, ElementKind, FunctionFacts, LocatedElement, ModuleCallCount, ModuleCount,
    SnapshotInfo, Statistics, TypeFacts, TypeUse,
};
pub use rusqlite::types::Value as SqlValue;
pub use schema::SCHEMA_VERSION;
pub use session::ReadSession;
pub use sql::{json_to_value, NameFilter, RowSet, SqlParams};
pub use store::{IngestMeta, KnowledgeStore, ReplaceSummary};
