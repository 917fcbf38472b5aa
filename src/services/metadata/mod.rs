//! Series metadata collaborator: per-season episode counts, season names,
//! alternate episode groups and episode titles.

mod cached;
mod tmdb;

pub use cached::CachedMetadataProvider;
pub use tmdb::TmdbProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{EpisodeMeta, SeriesMetadata};

/// Errors that can occur during metadata retrieval
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Request to the metadata service failed
    #[error("Request failed: {0}")]
    Request(String),

    /// Failed to parse the service's JSON response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// The requested series or season does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No metadata service is configured
    #[error("Metadata provider not configured")]
    NotConfigured,
}

/// Source of canonical series metadata, keyed by catalog id
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Series details with the preferred episode group already merged
    async fn series(&self, catalog_id: &str) -> Result<SeriesMetadata, MetadataError>;

    /// Episode listing of one canonical season
    async fn season_episodes(
        &self,
        catalog_id: &str,
        season: u32,
    ) -> Result<Vec<EpisodeMeta>, MetadataError>;
}

/// Stand-in used when no metadata service is configured; every call fails,
/// which makes numbering fall back to the caller's values.
pub struct NoMetadata;

#[async_trait]
impl MetadataProvider for NoMetadata {
    async fn series(&self, _catalog_id: &str) -> Result<SeriesMetadata, MetadataError> {
        Err(MetadataError::NotConfigured)
    }

    async fn season_episodes(
        &self,
        _catalog_id: &str,
        _season: u32,
    ) -> Result<Vec<EpisodeMeta>, MetadataError> {
        Err(MetadataError::NotConfigured)
    }
}
