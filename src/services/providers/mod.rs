//! Content provider collaborator: search, episode listing and stream lookup
//! against one third-party catalog.

mod anime_api;

pub use anime_api::{AnimeApiConfig, AnimeApiProvider};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Candidate, EpisodeRef, StreamInfo};

/// Provider call failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// A third-party content catalog.
///
/// Candidate and episode ids are opaque to callers and only meaningful to
/// the provider that issued them.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Short lowercase provider name, used in cache keys and logs
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, ProviderError>;

    async fn episodes(&self, candidate_id: &str) -> Result<Vec<EpisodeRef>, ProviderError>;

    async fn stream(&self, episode_id: &str) -> Result<StreamInfo, ProviderError>;
}
