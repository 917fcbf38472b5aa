//! Numbering resolver
//!
//! Reconciles a caller's (season, episode) with the numbering providers
//! expect: providers often split one official season into parts or only
//! know absolute episode numbers.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{MediaKind, NumberingRequest, ResolvedNumbering, SeriesMetadata};
use crate::services::metadata::MetadataProvider;
use crate::services::overrides::OverrideTable;

pub struct NumberingResolver {
    metadata: Arc<dyn MetadataProvider>,
    overrides: Arc<OverrideTable>,
}

impl NumberingResolver {
    pub fn new(metadata: Arc<dyn MetadataProvider>, overrides: Arc<OverrideTable>) -> Self {
        Self {
            metadata,
            overrides,
        }
    }

    /// Resolve the numbering for one request. Never fails: a metadata error
    /// yields the caller's numbers unchanged.
    pub async fn resolve(&self, request: &NumberingRequest) -> ResolvedNumbering {
        if request.catalog.media_kind == MediaKind::Movie {
            return ResolvedNumbering::uncorrected(1, 1);
        }

        let catalog_id = request.catalog.id.as_str();
        let season = request.requested_season;
        let episode = request.requested_episode;

        let metadata = match self.metadata.series(catalog_id).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(
                    catalog_id = catalog_id,
                    error = %e,
                    "Metadata unavailable, keeping requested numbering"
                );
                None
            }
        };

        let mut resolved = match &metadata {
            Some(metadata) => correct_numbering(metadata, season, episode),
            None => ResolvedNumbering::uncorrected(season, episode),
        };

        // Override table is local data and applies even without metadata
        if let Some(entry) = self.overrides.lookup(catalog_id, season, episode) {
            debug!(
                catalog_id = catalog_id,
                season = season,
                episode = episode,
                search_title = %entry.search_title,
                "Numbering override applied"
            );
            resolved.episode = entry.episode;
            resolved.override_title = Some(entry.search_title.clone());
        }

        if season == 0 && metadata.is_some() {
            resolved.episode_title = self.special_title(catalog_id, episode).await;
        }

        debug!(
            catalog_id = catalog_id,
            requested_season = season,
            requested_episode = episode,
            episode = resolved.episode,
            absolute_episode = resolved.absolute_episode,
            "Numbering resolved"
        );
        resolved
    }

    async fn special_title(&self, catalog_id: &str, episode: u32) -> Option<String> {
        match self.metadata.season_episodes(catalog_id, 0).await {
            Ok(list) => list
                .into_iter()
                .find(|e| e.episode_number == episode)
                .map(|e| e.name),
            Err(e) => {
                debug!(catalog_id = catalog_id, error = %e, "No specials listing");
                None
            }
        }
    }
}

/// Offset, absolute-number remap and season name, without overrides
fn correct_numbering(metadata: &SeriesMetadata, season: u32, episode: u32) -> ResolvedNumbering {
    let group = metadata.numbering_group();
    let offset = group.offset_before(season);
    let entry = group.entry(season);

    let mut resolved = ResolvedNumbering::uncorrected(season, episode);
    resolved.absolute_episode = episode.saturating_add(offset);

    if let Some(entry) = entry {
        if episode > entry.episode_count {
            // The caller's number looks absolute; only remap when it lands
            // inside this season, otherwise keep it as given
            match episode.checked_sub(offset) {
                Some(remainder) if remainder >= 1 && remainder <= entry.episode_count => {
                    resolved.episode = remainder;
                    resolved.absolute_episode = episode;
                }
                _ => {}
            }
        }
    }

    resolved.season_name = metadata
        .season(season)
        .map(|s| s.name.clone())
        .or_else(|| entry.and_then(|e| e.name.clone()));

    resolved
}
