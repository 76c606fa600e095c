use codefacts_analysis::AnalysisError;
use codefacts_facts::FactsError;
use codefacts_graph::GraphError;
use codefacts_protocol::ErrorKind;
use codefacts_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed request, unsupported field/operator or a disallowed statement.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ingestion(#[from] FactsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl QueryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QueryError::InvalidQuery(message.into())
    }

    /// Wire kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::InvalidQuery(_) | QueryError::Config(_) => ErrorKind::InvalidQueryError,
            QueryError::Ingestion(_) => ErrorKind::IngestionFormatError,
            QueryError::Store(err) => store_kind(err),
            QueryError::Graph(GraphError::Store(err)) => store_kind(err),
            QueryError::Graph(GraphError::InvalidTraversal(_)) => ErrorKind::InvalidQueryError,
            QueryError::Analysis(AnalysisError::Store(err)) => store_kind(err),
            QueryError::Analysis(AnalysisError::InvalidPattern(_)) => ErrorKind::InvalidQueryError,
            QueryError::Encode(_) => ErrorKind::InternalError,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::StoreUnavailableError => {
                Some("The store could not be reached; retry, or check the database path")
            }
            ErrorKind::IngestionFormatError => {
                Some("Point the loader at a directory of per-module JSON fact files")
            }
            ErrorKind::InvalidQueryError => Some("Run the `capabilities` operation for accepted shapes"),
            _ => None,
        }
    }
}

fn store_kind(err: &StoreError) -> ErrorKind {
    if err.is_unavailable() {
        ErrorKind::StoreUnavailableError
    } else if matches!(err, StoreError::Rejected(_)) {
        ErrorKind::InvalidQueryError
    } else {
        ErrorKind::InternalError
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_failure() {
        assert_eq!(QueryError::invalid("x").kind(), ErrorKind::InvalidQueryError);
        assert_eq!(
            QueryError::from(FactsError::NoModules {
                root: "dump".into(),
                failures: 2
            })
            .kind(),
            ErrorKind::IngestionFormatError
        );
        assert_eq!(
            QueryError::from(StoreError::Unavailable {
                path: "db".into(),
                reason: "gone".into()
            })
            .kind(),
            ErrorKind::StoreUnavailableError
        );
        assert_eq!(
            QueryError::from(StoreError::Rejected("write".into())).kind(),
            ErrorKind::InvalidQueryError
        );
        assert_eq!(
            QueryError::from(AnalysisError::InvalidPattern("bad".into())).kind(),
            ErrorKind::InvalidQueryError
        );
    }
}
