//! # Codefacts Facts
//!
//! Reads the per-module fact dump produced by an external static-analysis
//! extractor and normalizes it into a [`Snapshot`].
//!
//! ## Pipeline
//!
//! ```text
//! dump dir
//!     │
//!     ├──> DumpScanner    (*.json files, sorted, oversized skipped)
//!     ├──> RawModule      (serde, unknown fields ignored)
//!     └──> FactLoader
//!            ├─ drop empty / duplicate modules (warning)
//!            ├─ flatten `where` helpers as `parent::local`
//!            ├─ assign deterministic ids in natural-key order
//!            └─ resolve calls and type references (dangling edges kept)
//! ```
//!
//! A file that fails to parse only produces an [`IngestWarning`]. Loading fails
//! outright only when no module at all could be read.

mod dump;
mod error;
mod loader;
mod model;
mod resolve;
mod scanner;
pub mod signature;

pub use dump::{
    RawCall, RawClass, RawConstructor, RawField, RawFunction, RawImport, RawInstance, RawMethod,
    RawModule, RawSpan, RawSymbolRef, RawType, RawTypeRef,
};
pub use error::{FactsError, Result};
pub use loader::{FactLoader, IngestWarning, LoadReport, SourceModule};
pub use model::{
    CallEdge, Class, ClassMethod, Constructor, EdgeSource, EntityId, EntityRef, Field, Function, Import,
    Instance, Location, Module, NaturalKey, Snapshot, Span, TypeDef, TypeEdge, TypeKind,
    TypeRelation,
};
pub use resolve::LOCAL_SEPARATOR;
pub use scanner::{DumpScanner, ScanOutcome};
