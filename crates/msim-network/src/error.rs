use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Dangling node/segment/lane references discovered at load time.
    /// Fatal — a simulation over a broken graph is meaningless.
    #[error("network inconsistent: {0}")]
    Inconsistent(String),

    #[error("stored procedure for {0:?} is required but not configured")]
    MissingProcedure(&'static str),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
