//! Resolution pipeline
//!
//! numbering -> candidate search -> ranking -> episode matching -> stream
//! lookup, tried against each configured provider in order.

use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{Candidate, EpisodeRef, NumberingRequest, ResolvedNumbering, StreamInfo};
use crate::services::matcher::{EpisodeMatcher, MatchOutcome};
use crate::services::numbering::NumberingResolver;
use crate::services::providers::ContentProvider;
use crate::services::ranker::rank_candidates;
use crate::services::search::{SearchContext, SearchOrchestrator};

/// A playable stream located on one provider
#[derive(Debug, Clone)]
pub struct StreamMatch {
    pub provider: String,
    pub candidate: Candidate,
    pub episode: EpisodeRef,
    pub stream: StreamInfo,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub numbering: ResolvedNumbering,
    pub found: Option<StreamMatch>,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        self.found.is_some()
    }
}

pub struct StreamResolver {
    numbering: NumberingResolver,
    search: SearchOrchestrator,
    matcher: EpisodeMatcher,
    providers: Vec<Arc<dyn ContentProvider>>,
}

impl StreamResolver {
    pub fn new(
        numbering: NumberingResolver,
        search: SearchOrchestrator,
        matcher: EpisodeMatcher,
        providers: Vec<Arc<dyn ContentProvider>>,
    ) -> Self {
        Self {
            numbering,
            search,
            matcher,
            providers,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run the pipeline. "Not found" is a normal outcome, never an error.
    pub async fn resolve(&self, request: &NumberingRequest) -> Resolution {
        let numbering = self.numbering.resolve(request).await;
        let ctx = SearchContext {
            catalog: &request.catalog,
            numbering: &numbering,
        };

        for provider in &self.providers {
            let provider = provider.as_ref();
            let outcome = self.search.search(provider, &ctx).await;
            if outcome.candidates.is_empty() {
                continue;
            }

            let ranked = rank_candidates(outcome.candidates, &request.catalog, &numbering);
            let (candidate, episode) = match self.matcher.find(provider, &ranked, &numbering).await {
                MatchOutcome::Matched { candidate, episode } => (candidate, episode),
                MatchOutcome::Exhausted => continue,
            };

            match provider.stream(&episode.id).await {
                Ok(stream) => {
                    info!(
                        provider = provider.name(),
                        catalog_id = %request.catalog.id,
                        candidate = %candidate.id,
                        episode = %episode.id,
                        "Stream resolved"
                    );
                    return Resolution {
                        numbering,
                        found: Some(StreamMatch {
                            provider: provider.name().to_string(),
                            candidate,
                            episode,
                            stream,
                        }),
                    };
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        episode = %episode.id,
                        error = %e,
                        "Stream lookup failed, trying next provider"
                    );
                }
            }
        }

        info!(
            catalog_id = %request.catalog.id,
            season = numbering.season,
            episode = numbering.episode,
            "No stream found"
        );
        Resolution {
            numbering,
            found: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateKind, CatalogRef, MediaKind};
    use crate::services::cache::Cache;
    use crate::services::overrides::OverrideTable;
    use crate::services::testing::{candidate, episodes, FakeMetadata, FakeProvider};
    use std::time::Duration;

    fn request(id: &str, title: &str, season: u32, episode: u32) -> NumberingRequest {
        NumberingRequest {
            catalog: CatalogRef {
                id: id.to_string(),
                media_kind: MediaKind::Series,
                title: title.to_string(),
                original_title: None,
                year: None,
                runtime_minutes: None,
            },
            requested_season: season,
            requested_episode: episode,
        }
    }

    fn resolver(
        metadata: FakeMetadata,
        overrides: OverrideTable,
        providers: Vec<Arc<dyn ContentProvider>>,
    ) -> StreamResolver {
        let cache = Cache::memory(128);
        StreamResolver::new(
            NumberingResolver::new(Arc::new(metadata), Arc::new(overrides)),
            SearchOrchestrator::new(cache.clone(), Duration::from_secs(60)),
            EpisodeMatcher::new(cache, Duration::from_secs(60)),
            providers,
        )
    }

    #[tokio::test]
    async fn test_first_episode_resolves_end_to_end() {
        let provider = Arc::new(
            FakeProvider::named("fake")
                .with_search("Show", vec![candidate("show-1", "Show", CandidateKind::Tv)])
                .with_episodes("show-1", episodes("show-1", 1..=12))
                .with_stream("show-1::1", "https://cdn.example/show/1/master.m3u8"),
        );
        let metadata = FakeMetadata::with_seasons("50", &[(1, "Season 1", 12)]);

        let resolution = resolver(metadata, OverrideTable::empty(), vec![provider])
            .resolve(&request("50", "Show", 1, 1))
            .await;

        assert!(resolution.is_matched());
        let found = resolution.found.unwrap();
        assert_eq!(found.episode.id, "show-1::1");
        assert_eq!(found.stream.descriptor.url, "https://cdn.example/show/1/master.m3u8");
        assert_eq!(found.provider, "fake");
    }

    #[tokio::test]
    async fn test_override_searches_part_title_only() {
        let provider = Arc::new(
            FakeProvider::named("fake")
                .with_search("X Part 3", vec![candidate("x3", "X Part 3", CandidateKind::Tv)])
                .with_episodes("x3", episodes("x3", 1..=2))
                .with_stream("x3::1", "https://cdn.example/x3/1.m3u8"),
        );
        let metadata = FakeMetadata::with_seasons("77", &[(0, "Specials", 40), (1, "Season 1", 12)]);
        let overrides = OverrideTable::from_json(
            r#"{"77": {"0": {"36": {"searchTitle": "X Part 3", "episode": 1}}}}"#,
        )
        .unwrap();

        let resolver = resolver(metadata, overrides, vec![provider.clone()]);
        let resolution = resolver.resolve(&request("77", "X", 0, 36)).await;

        assert_eq!(provider.issued_queries(), vec!["X Part 3".to_string()]);
        assert_eq!(resolution.found.unwrap().episode.id, "x3::1");
        assert_eq!(resolution.numbering.episode, 1);
    }

    #[tokio::test]
    async fn test_failed_stream_falls_through_to_next_provider() {
        let broken = Arc::new(
            FakeProvider::named("broken")
                .with_search("Show", vec![candidate("a", "Show", CandidateKind::Tv)])
                .with_episodes("a", episodes("a", 1..=3)),
        );
        let working = Arc::new(
            FakeProvider::named("working")
                .with_search("Show", vec![candidate("b", "Show", CandidateKind::Tv)])
                .with_episodes("b", episodes("b", 1..=3))
                .with_stream("b::2", "https://cdn.example/b/2.m3u8"),
        );

        let resolution = resolver(
            FakeMetadata::default(),
            OverrideTable::empty(),
            vec![broken, working],
        )
        .resolve(&request("1", "Show", 1, 2))
        .await;

        assert_eq!(resolution.found.unwrap().provider, "working");
    }

    #[tokio::test]
    async fn test_no_candidates_is_unmatched() {
        let provider = Arc::new(FakeProvider::named("fake"));
        let resolution = resolver(FakeMetadata::default(), OverrideTable::empty(), vec![provider])
            .resolve(&request("1", "Nothing", 2, 3))
            .await;

        assert!(!resolution.is_matched());
        assert_eq!(resolution.numbering, ResolvedNumbering::uncorrected(2, 3));
    }
}
