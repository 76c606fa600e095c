use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Store error: {0}")]
    Store(#[from] codefacts_store::StoreError),

    #[error("Invalid traversal: {0}")]
    InvalidTraversal(String),
}
