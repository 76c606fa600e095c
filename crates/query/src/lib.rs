//! # Codefacts Query
//!
//! The façade every transport talks to. An [`Engine`] owns the configuration,
//! the knowledge store and the derived caches, and answers JSON requests of the
//! form `{"operation": "...", "payload": {...}}` with a [`Response`] envelope.
//!
//! ## Query surfaces
//!
//! ```text
//! find_* lookups       name / pattern, bounded by limit
//! structured_query     {target, where: [{field, op, value}], order_by}
//!                        └─ allow-listed columns, bound values
//! raw_query            SELECT / WITH only, single statement,
//!                        read-only per SQLite, query_only connection
//! ```
//!
//! Graph and analysis operations route to `codefacts-graph` and
//! `codefacts-analysis`. Every read runs on one pinned snapshot, so a request
//! never observes a half-applied ingestion.
//!
//! ## Example
//!
//! ```no_run
//! use codefacts_query::{Engine, EngineConfig};
//! use serde_json::json;
//!
//! let engine = Engine::open(EngineConfig::new("facts.db"))?;
//! engine.ingest(Some(std::path::Path::new("dump")))?;
//! let response = engine.execute(&json!({
//!     "operation": "call_graph",
//!     "payload": {"function": "Main.main", "depth": 2}
//! }));
//! assert!(!response.is_error());
//! # Ok::<(), codefacts_query::QueryError>(())
//! ```
//!
//! [`Response`]: codefacts_protocol::Response

mod config;
mod descriptor;
mod engine;
mod error;
mod raw;
mod refs;
mod request;
mod services;

pub use config::{EngineConfig, DEFAULT_DB_FILE};
pub use descriptor::{Compiled, Condition, Operator, OrderBy, StructuredQuery, Target, OPERATORS};
pub use engine::{Engine, IngestReport};
pub use error::{QueryError, Result};
pub use raw::{check_statement, params_from_json, ALLOWED_VERBS};
pub use refs::{entity_ref, module_name};
pub use request::{BatchItem, Operation, QueryRequest, MAX_BATCH_ITEMS};
pub use services::{Capabilities, StructuredCapabilities};
