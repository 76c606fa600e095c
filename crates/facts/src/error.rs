use thiserror::Error;

pub type Result<T> = std::result::Result<T, FactsError>;

#[derive(Error, Debug)]
pub enum FactsError {
    #[error("Invalid fact dump path: {0}")]
    InvalidPath(String),

    /// Every candidate file failed to parse; nothing can be ingested.
    #[error("No module could be loaded from {root} ({failures} file(s) rejected)")]
    NoModules { root: String, failures: usize },
}
