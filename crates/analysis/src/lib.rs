//! # Codefacts Analysis
//!
//! Derived views over a snapshot: complexity scores, function similarity,
//! structural pattern search and unused-import detection. Nothing here writes
//! to the store; the only state is a memo of complexity scores keyed by
//! snapshot generation.
//!
//! ## Example
//!
//! ```no_run
//! use codefacts_analysis::{AnalysisEngine, ComplexityCache, PatternSpec};
//! use codefacts_protocol::{Limits, Page};
//! use codefacts_store::KnowledgeStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KnowledgeStore::open("facts.db")?;
//! let session = store.read()?;
//! let cache = ComplexityCache::new();
//! let analysis = AnalysisEngine::new(&session, Limits::default(), &cache);
//!
//! let leaves = PatternSpec::from_json(serde_json::json!({"no_outgoing_calls": true}))?;
//! for hit in analysis.find_patterns(None, &leaves, Page::default())?.items {
//!     println!("{hit:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod complexity;
mod engine;
mod error;
mod imports;
mod patterns;
pub mod similarity;

pub use complexity::{ComplexityCache, ComplexityInputs, ComplexityScore};
pub use engine::{
    AnalysisEngine, ComplexityResult, ElementAt, FunctionImports, PatternMatch, SimilarFunctions,
    SimilarityGroups,
};
pub use error::{AnalysisError, Result};
pub use imports::{
    check_import, import_statement, required_modules, ImportedModule, RequiredImport, UnusedImport,
    UnusedReason,
};
pub use patterns::{PatternSpec, PatternTarget};
pub use similarity::{SimilarityGroup, SimilarityMatch, DEFAULT_THRESHOLD};
