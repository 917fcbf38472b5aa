//! Episode matcher
//!
//! Walks ranked candidates in order, fetches each one's episode list and
//! applies ordered matching strategies. The first hit ends the walk.

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{Candidate, CandidateKind, EpisodeRef, ResolvedNumbering};
use crate::services::cache::Cache;
use crate::services::normalize::normalize;
use crate::services::providers::ContentProvider;

lazy_static! {
    static ref SPECIALS_TITLE: Regex =
        Regex::new(r"(?i)\b(specials?|oavs?|ovas?)\b").unwrap();
}

/// Terminal state of a matcher walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched {
        candidate: Candidate,
        episode: EpisodeRef,
    },
    /// No candidate had an acceptable episode; not an error
    Exhausted,
}

struct MatchContext<'a> {
    numbering: &'a ResolvedNumbering,
    specials_collection: bool,
}

type MatchStrategy = fn(&MatchContext<'_>, &[EpisodeRef]) -> Option<usize>;

/// Strategies tried in order against each candidate's episode list
const STRATEGIES: &[(&str, MatchStrategy)] = &[
    ("absolute", absolute_match),
    ("relative", relative_match),
    ("title", title_match),
];

fn position_of(episodes: &[EpisodeRef], number: u32) -> Option<usize> {
    episodes.iter().position(|e| e.number == number)
}

/// Later seasons listed with continuous numbering
fn absolute_match(ctx: &MatchContext<'_>, episodes: &[EpisodeRef]) -> Option<usize> {
    let n = ctx.numbering;
    if n.season <= 1 || n.has_override() || ctx.specials_collection {
        return None;
    }
    position_of(episodes, n.absolute_episode).or_else(|| position_of(episodes, n.episode))
}

fn relative_match(ctx: &MatchContext<'_>, episodes: &[EpisodeRef]) -> Option<usize> {
    let n = ctx.numbering;
    if n.season > 1 && !n.has_override() && !ctx.specials_collection {
        return None;
    }
    position_of(episodes, n.episode)
}

fn title_match(ctx: &MatchContext<'_>, episodes: &[EpisodeRef]) -> Option<usize> {
    let n = ctx.numbering;
    if n.season != 0 {
        return None;
    }
    let wanted = normalize(n.episode_title.as_deref()?);
    if wanted.is_empty() {
        return None;
    }

    episodes.iter().position(|e| {
        let title = normalize(e.title.as_deref().unwrap_or_default());
        !title.is_empty() && (title == wanted || title.contains(&wanted) || wanted.contains(&title))
    })
}

fn is_specials_collection(candidate: &Candidate) -> bool {
    matches!(candidate.kind, CandidateKind::Special | CandidateKind::Ova)
        || SPECIALS_TITLE.is_match(&candidate.title)
}

pub struct EpisodeMatcher {
    cache: Cache,
    ttl: Duration,
}

impl EpisodeMatcher {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn find(
        &self,
        provider: &dyn ContentProvider,
        candidates: &[Candidate],
        numbering: &ResolvedNumbering,
    ) -> MatchOutcome {
        for candidate in candidates {
            let episodes = self.episodes(provider, &candidate.id).await;
            if episodes.is_empty() {
                debug!(provider = provider.name(), candidate = %candidate.id, "Candidate has no episodes, skipping");
                continue;
            }

            let ctx = MatchContext {
                numbering,
                specials_collection: is_specials_collection(candidate),
            };

            for (strategy, matcher) in STRATEGIES {
                if let Some(index) = matcher(&ctx, &episodes) {
                    let episode = episodes[index].clone();
                    info!(
                        provider = provider.name(),
                        candidate = %candidate.id,
                        title = %candidate.title,
                        episode = episode.number,
                        strategy = strategy,
                        "Episode matched"
                    );
                    return MatchOutcome::Matched {
                        candidate: candidate.clone(),
                        episode,
                    };
                }
            }
        }

        debug!(provider = provider.name(), candidates = candidates.len(), "No candidate matched");
        MatchOutcome::Exhausted
    }

    /// Episode list of one candidate, cached. Fetch errors count as empty.
    async fn episodes(&self, provider: &dyn ContentProvider, candidate_id: &str) -> Vec<EpisodeRef> {
        let cache_key = format!("episodes:{}:{}", provider.name(), candidate_id);
        if let Some(cached) = self.cache.get::<Vec<EpisodeRef>>(&cache_key).await {
            return cached;
        }

        match provider.episodes(candidate_id).await {
            Ok(episodes) => {
                if !episodes.is_empty() {
                    self.cache.set(&cache_key, &episodes, self.ttl).await;
                }
                episodes
            }
            Err(e) => {
                warn!(provider = provider.name(), candidate = candidate_id, error = %e, "Episode list fetch failed");
                Vec::new()
            }
        }
    }
}
