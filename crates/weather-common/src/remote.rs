//! Remote weather service seam.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::position::Position;

/// Opaque provider response. Shared so cache hits never deep-copy the JSON.
pub type Payload = Arc<serde_json::Value>;

/// Failures reported by a remote weather service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Error code embedded in an otherwise successful response.
    #[error("Provider error {code}: {message}")]
    Application { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// A request/response weather provider for a single position.
#[async_trait]
pub trait WeatherService: Send + Sync {
    /// Fetch the raw provider payload for `position`.
    async fn fetch(&self, position: Position) -> Result<Payload, RemoteError>;
}

#[async_trait]
impl<T: WeatherService + ?Sized> WeatherService for Arc<T> {
    async fn fetch(&self, position: Position) -> Result<Payload, RemoteError> {
        (**self).fetch(position).await
    }
}
