use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("resource not found upstream")]
    NotFound,

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A producer failure observed through the in-flight dedup map; every
    /// caller awaiting the same key receives the same underlying error.
    #[error(transparent)]
    Shared(Arc<ResolveError>),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(429) {
            Self::RateLimited
        } else if err.status().map(|s| s.as_u16()) == Some(404) {
            Self::NotFound
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
