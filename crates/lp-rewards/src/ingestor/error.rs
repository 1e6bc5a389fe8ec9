use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("rate limited by source: {0}")]
    RateLimited(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("fetched {fetched} records, above the ceiling of {limit}")]
    PageLimitExceeded { limit: usize, fetched: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether a retry may succeed where the last attempt failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::RateLimited(_))
    }
}
