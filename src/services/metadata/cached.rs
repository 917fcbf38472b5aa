//! Cached metadata provider implementation
//!
//! Wraps another provider and keeps series details and season listings in
//! the shared cache. Cache failures never block a lookup.

use async_trait::async_trait;
use std::time::Duration;

use super::{MetadataError, MetadataProvider};
use crate::models::{EpisodeMeta, SeriesMetadata};
use crate::services::cache::Cache;

/// A caching wrapper for metadata providers
pub struct CachedMetadataProvider<P>
where
    P: MetadataProvider,
{
    /// The underlying metadata provider
    provider: P,
    cache: Cache,
    ttl: Duration,
}

impl<P> CachedMetadataProvider<P>
where
    P: MetadataProvider,
{
    pub fn new(provider: P, cache: Cache, ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            ttl,
        }
    }
}

#[async_trait]
impl<P> MetadataProvider for CachedMetadataProvider<P>
where
    P: MetadataProvider,
{
    async fn series(&self, catalog_id: &str) -> Result<SeriesMetadata, MetadataError> {
        let key = format!("metadata:series:{}", catalog_id);
        if let Some(series) = self.cache.get::<SeriesMetadata>(&key).await {
            return Ok(series);
        }

        let series = self.provider.series(catalog_id).await?;
        self.cache.set(&key, &series, self.ttl).await;
        Ok(series)
    }

    async fn season_episodes(
        &self,
        catalog_id: &str,
        season: u32,
    ) -> Result<Vec<EpisodeMeta>, MetadataError> {
        let key = format!("metadata:season:{}:{}", catalog_id, season);
        if let Some(episodes) = self.cache.get::<Vec<EpisodeMeta>>(&key).await {
            return Ok(episodes);
        }

        let episodes = self.provider.season_episodes(catalog_id, season).await?;
        self.cache.set(&key, &episodes, self.ttl).await;
        Ok(episodes)
    }
}
