//! Error types for the geospatial cache.

use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    Config(String),

    #[error("cache persistence I/O error: {0}")]
    Io(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}
