//! In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    Candidate, CandidateKind, EpisodeMeta, EpisodeRef, GroupEntry, NumberingGroup,
    SeasonSummary, SeriesMetadata, StreamDescriptor, StreamInfo,
};
use crate::services::metadata::{MetadataError, MetadataProvider};
use crate::services::providers::{ContentProvider, ProviderError};

pub fn candidate(id: &str, title: &str, kind: CandidateKind) -> Candidate {
    Candidate {
        id: id.to_string(),
        title: title.to_string(),
        kind,
    }
}

pub fn episode(candidate_id: &str, number: u32) -> EpisodeRef {
    EpisodeRef {
        id: format!("{}::{}", candidate_id, number),
        number,
        title: None,
    }
}

pub fn episodes(candidate_id: &str, range: std::ops::RangeInclusive<u32>) -> Vec<EpisodeRef> {
    range.map(|n| episode(candidate_id, n)).collect()
}

// ============ Metadata ============

#[derive(Default)]
pub struct FakeMetadata {
    pub series: HashMap<String, SeriesMetadata>,
    pub season_titles: HashMap<(String, u32), Vec<EpisodeMeta>>,
    pub calls: Mutex<usize>,
}

impl FakeMetadata {
    /// Series whose canonical seasons are `(number, name, episode_count)`
    pub fn with_seasons(catalog_id: &str, seasons: &[(u32, &str, u32)]) -> Self {
        let mut fake = Self::default();
        fake.series.insert(
            catalog_id.to_string(),
            SeriesMetadata {
                title: "Fake Series".to_string(),
                seasons: seasons
                    .iter()
                    .map(|(number, name, count)| SeasonSummary {
                        season_number: *number,
                        name: name.to_string(),
                        episode_count: *count,
                    })
                    .collect(),
                ..Default::default()
            },
        );
        fake
    }

    pub fn with_group(mut self, catalog_id: &str, entries: &[(u32, &str, u32)]) -> Self {
        if let Some(series) = self.series.get_mut(catalog_id) {
            series.episode_group = Some(NumberingGroup::new(
                entries
                    .iter()
                    .map(|(order, name, count)| GroupEntry {
                        order: *order,
                        name: Some(name.to_string()),
                        episode_count: *count,
                    })
                    .collect(),
            ));
        }
        self
    }

    pub fn with_episode_titles(mut self, catalog_id: &str, season: u32, titles: &[(u32, &str)]) -> Self {
        self.season_titles.insert(
            (catalog_id.to_string(), season),
            titles
                .iter()
                .map(|(n, name)| EpisodeMeta {
                    episode_number: *n,
                    name: name.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn series(&self, catalog_id: &str) -> Result<SeriesMetadata, MetadataError> {
        *self.calls.lock().unwrap() += 1;
        self.series
            .get(catalog_id)
            .cloned()
            .ok_or_else(|| MetadataError::Request(format!("unreachable for {}", catalog_id)))
    }

    async fn season_episodes(
        &self,
        catalog_id: &str,
        season: u32,
    ) -> Result<Vec<EpisodeMeta>, MetadataError> {
        *self.calls.lock().unwrap() += 1;
        self.season_titles
            .get(&(catalog_id.to_string(), season))
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("{} season {}", catalog_id, season)))
    }
}

// ============ Provider ============

#[derive(Default)]
pub struct FakeProvider {
    pub name: String,
    /// Results keyed by exact query string
    pub search_results: HashMap<String, Vec<Candidate>>,
    pub failing_queries: Vec<String>,
    pub episode_lists: HashMap<String, Vec<EpisodeRef>>,
    pub failing_episode_lists: Vec<String>,
    pub streams: HashMap<String, StreamInfo>,
    pub queries: Mutex<Vec<String>>,
    pub episode_fetches: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_search(mut self, query: &str, results: Vec<Candidate>) -> Self {
        self.search_results.insert(query.to_string(), results);
        self
    }

    pub fn with_failing_search(mut self, query: &str) -> Self {
        self.failing_queries.push(query.to_string());
        self
    }

    pub fn with_episodes(mut self, candidate_id: &str, list: Vec<EpisodeRef>) -> Self {
        self.episode_lists.insert(candidate_id.to_string(), list);
        self
    }

    pub fn with_failing_episodes(mut self, candidate_id: &str) -> Self {
        self.failing_episode_lists.push(candidate_id.to_string());
        self
    }

    pub fn with_stream(mut self, episode_id: &str, url: &str) -> Self {
        self.streams.insert(
            episode_id.to_string(),
            StreamInfo {
                descriptor: StreamDescriptor {
                    url: url.to_string(),
                    headers: Default::default(),
                },
                subtitles: Vec::new(),
                quality: None,
            },
        );
        self
    }

    pub fn issued_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn fetched_episode_lists(&self) -> Vec<String> {
        self.episode_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing_queries.iter().any(|q| q == query) {
            return Err(ProviderError::Network("connection reset".to_string()));
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }

    async fn episodes(&self, candidate_id: &str) -> Result<Vec<EpisodeRef>, ProviderError> {
        self.episode_fetches
            .lock()
            .unwrap()
            .push(candidate_id.to_string());
        if self.failing_episode_lists.iter().any(|id| id == candidate_id) {
            return Err(ProviderError::Http(503));
        }
        Ok(self
            .episode_lists
            .get(candidate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn stream(&self, episode_id: &str) -> Result<StreamInfo, ProviderError> {
        self.streams
            .get(episode_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(episode_id.to_string()))
    }
}
