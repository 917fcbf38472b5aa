//! TMDB metadata client
//!
//! Fetches series details, selects the "Seasons" episode group when TMDB
//! exposes one and merges it over the canonical season list.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MetadataError, MetadataProvider};
use crate::models::{EpisodeMeta, GroupEntry, NumberingGroup, SeasonSummary, SeriesMetadata};

/// TMDB episode group type for "seasons" style regroupings
const SEASONS_GROUP_TYPE: u32 = 6;

// ===== Wire types =====

#[derive(Debug, Deserialize)]
struct TmdbSeries {
    name: String,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    seasons: Vec<TmdbSeason>,
    #[serde(default)]
    episode_groups: Option<TmdbGroupList>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeason {
    season_number: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    episode_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TmdbGroupList {
    #[serde(default)]
    results: Vec<TmdbGroupSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct TmdbGroupSummary {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: u32,
}

#[derive(Debug, Deserialize)]
struct TmdbGroupDetails {
    #[serde(default)]
    groups: Vec<TmdbGroup>,
}

#[derive(Debug, Deserialize)]
struct TmdbGroup {
    name: String,
    order: u32,
    #[serde(default)]
    episodes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetails {
    #[serde(default)]
    episodes: Vec<TmdbEpisode>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    episode_number: u32,
    #[serde(default)]
    name: Option<String>,
}

// ===== Client =====

/// Metadata provider backed by the TMDB v3 API
pub struct TmdbProvider {
    http: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl TmdbProvider {
    pub fn new(base_url: &str, api_key: &str, language: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, MetadataError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("TMDB request: {}", endpoint);

        let response = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| MetadataError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound(endpoint.to_string()));
        }
        if !status.is_success() {
            return Err(MetadataError::Request(format!("{} returned {}", endpoint, status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| MetadataError::Request(e.to_string()))?;

        serde_json::from_str(&text).map_err(|e| {
            debug!("Response text: {}", body_excerpt(&text, 500));
            MetadataError::Parse(e.to_string())
        })
    }

    async fn fetch_group_entries(&self, group_id: &str) -> Result<Vec<GroupEntry>, MetadataError> {
        let details: TmdbGroupDetails = self
            .get(&format!("/tv/episode_group/{}", group_id), &[])
            .await?;

        Ok(details
            .groups
            .into_iter()
            .map(|g| GroupEntry {
                order: g.order,
                name: Some(g.name),
                episode_count: g.episodes.len() as u32,
            })
            .collect())
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    async fn series(&self, catalog_id: &str) -> Result<SeriesMetadata, MetadataError> {
        let series: TmdbSeries = self
            .get(
                &format!("/tv/{}", catalog_id),
                &[("append_to_response", "episode_groups")],
            )
            .await?;

        let seasons: Vec<SeasonSummary> = series
            .seasons
            .iter()
            .map(|s| SeasonSummary {
                season_number: s.season_number,
                name: s
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Season {}", s.season_number)),
                episode_count: s.episode_count.unwrap_or(0),
            })
            .collect();

        let groups = series
            .episode_groups
            .as_ref()
            .map(|g| g.results.as_slice())
            .unwrap_or_default();

        // A failing group lookup leaves the canonical seasons in charge
        let episode_group = match select_seasons_group(groups) {
            Some(group) => {
                debug!(catalog_id = catalog_id, group = %group.name, "Using TMDB episode group");
                match self.fetch_group_entries(&group.id).await {
                    Ok(entries) if !entries.is_empty() => Some(merge_group(&seasons, entries)),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(catalog_id = catalog_id, error = %e, "Failed to load episode group");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SeriesMetadata {
            title: series.name,
            original_title: series.original_name,
            year: series
                .first_air_date
                .as_deref()
                .and_then(|d| d.get(..4))
                .and_then(|y| y.parse().ok()),
            runtime_minutes: series.episode_run_time.first().copied(),
            seasons,
            episode_group,
        })
    }

    async fn season_episodes(
        &self,
        catalog_id: &str,
        season: u32,
    ) -> Result<Vec<EpisodeMeta>, MetadataError> {
        let details: TmdbSeasonDetails = self
            .get(&format!("/tv/{}/season/{}", catalog_id, season), &[])
            .await?;

        Ok(details
            .episodes
            .into_iter()
            .map(|e| EpisodeMeta {
                episode_number: e.episode_number,
                name: e
                    .name
                    .unwrap_or_else(|| format!("Episode {}", e.episode_number)),
            })
            .collect())
    }
}

/// Type-6 group named "Seasons…" first, then any type-6 group
/// First `max_chars` characters of a body, cut on a char boundary
fn body_excerpt(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(i, _)| &text[..i])
}

fn select_seasons_group(groups: &[TmdbGroupSummary]) -> Option<&TmdbGroupSummary> {
    groups
        .iter()
        .find(|g| g.kind == SEASONS_GROUP_TYPE && g.name.starts_with("Seasons"))
        .or_else(|| groups.iter().find(|g| g.kind == SEASONS_GROUP_TYPE))
}

/// Merge group seasons over the canonical ones.
///
/// Canonical season 0 survives when it lists more episodes than the group's
/// season 0 (or the group has none). Seasons present in both take the group
/// version; seasons only present on one side are kept.
fn merge_group(canonical: &[SeasonSummary], group: Vec<GroupEntry>) -> NumberingGroup {
    let mut merged: BTreeMap<u32, GroupEntry> = canonical
        .iter()
        .map(|s| {
            (
                s.season_number,
                GroupEntry {
                    order: s.season_number,
                    name: Some(s.name.clone()),
                    episode_count: s.episode_count,
                },
            )
        })
        .collect();

    let canonical_specials = canonical
        .iter()
        .find(|s| s.season_number == 0)
        .map(|s| s.episode_count);

    for entry in group {
        if entry.order == 0 {
            if let Some(count) = canonical_specials {
                if count > entry.episode_count {
                    continue;
                }
            }
        }
        merged.insert(entry.order, entry);
    }

    NumberingGroup::new(merged.into_values().collect())
}
