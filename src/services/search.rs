//! Candidate search orchestrator
//!
//! Issues a bounded, ordered set of query variants against one provider,
//! merges and deduplicates the results and drops candidates whose title
//! does not contain the requested title.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{Candidate, CatalogRef, ResolvedNumbering};
use crate::services::cache::Cache;
use crate::services::normalize::normalize;
use crate::services::providers::ContentProvider;

/// Inputs shared by every query strategy
pub struct SearchContext<'a> {
    pub catalog: &'a CatalogRef,
    pub numbering: &'a ResolvedNumbering,
}

/// Candidates found for one provider
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    /// True when the override title alone produced results
    pub override_hit: bool,
}

type QueryStrategy = fn(&SearchContext<'_>) -> Vec<String>;

/// Strategies run after the override title, in order
const STRATEGIES: &[QueryStrategy] = &[
    season_name_queries,
    specials_queries,
    season_number_queries,
    bare_title_query,
];

/// Season names shorter than this are too ambiguous to search alone
const MIN_STANDALONE_SEASON_NAME: usize = 10;

fn season_name_queries(ctx: &SearchContext<'_>) -> Vec<String> {
    let Some(season_name) = ctx.numbering.season_name.as_deref() else {
        return Vec::new();
    };

    let mut queries = vec![format!("{} {}", ctx.catalog.title, season_name)];
    if normalize(season_name).len() > MIN_STANDALONE_SEASON_NAME {
        queries.push(season_name.to_string());
    }
    queries
}

fn specials_queries(ctx: &SearchContext<'_>) -> Vec<String> {
    if ctx.numbering.season != 0 {
        return Vec::new();
    }

    let mut queries = vec![format!("{} Specials", ctx.catalog.title)];
    if let Some(episode_title) = ctx.numbering.episode_title.as_deref() {
        queries.push(format!("{}: {}", ctx.catalog.title, episode_title));
    }
    queries
}

fn season_number_queries(ctx: &SearchContext<'_>) -> Vec<String> {
    let season = ctx.numbering.season;
    if season <= 1 {
        return Vec::new();
    }

    vec![
        format!("{} Season {}", ctx.catalog.title, season),
        format!("{} {}", ctx.catalog.title, season),
    ]
}

fn bare_title_query(ctx: &SearchContext<'_>) -> Vec<String> {
    vec![ctx.catalog.title.clone()]
}

pub struct SearchOrchestrator {
    cache: Cache,
    ttl: Duration,
}

impl SearchOrchestrator {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn search(
        &self,
        provider: &dyn ContentProvider,
        ctx: &SearchContext<'_>,
    ) -> SearchOutcome {
        let mut seen_queries = HashSet::new();
        let mut collected = Vec::new();
        let mut override_hit = false;

        if let Some(override_title) = ctx.numbering.override_title.as_deref() {
            seen_queries.insert(normalize(override_title));
            let results = self.run_query(provider, override_title).await;
            override_hit = !results.is_empty();
            collected.extend(results);
        }

        if !override_hit {
            for strategy in STRATEGIES {
                for query in strategy(ctx) {
                    let key = normalize(&query);
                    if key.is_empty() || !seen_queries.insert(key) {
                        continue;
                    }
                    collected.extend(self.run_query(provider, &query).await);
                }
            }
        }

        let unique = dedupe_by_id(collected);
        let total = unique.len();
        let candidates = filter_by_title(unique, &requested_keys(ctx, override_hit));

        debug!(
            provider = provider.name(),
            queries = seen_queries.len(),
            found = total,
            kept = candidates.len(),
            override_hit = override_hit,
            "Candidate search complete"
        );

        SearchOutcome {
            candidates,
            override_hit,
        }
    }

    /// One query, cached per provider and normalized query.
    /// Errors are logged and count as an empty result.
    async fn run_query(&self, provider: &dyn ContentProvider, query: &str) -> Vec<Candidate> {
        let cache_key = format!("search:{}:{}", provider.name(), normalize(query));
        if let Some((cached, ttl)) = self.cache.get_fresh::<Vec<Candidate>>(&cache_key).await {
            debug!(
                provider = provider.name(),
                query = query,
                hits = cached.len(),
                ttl_remaining_secs = ?ttl.map(|t| t.as_secs()),
                "Search cache hit"
            );
            return cached;
        }

        match provider.search(query).await {
            Ok(results) => {
                debug!(provider = provider.name(), query = query, hits = results.len(), "Search query");
                self.cache.set(&cache_key, &results, self.ttl).await;
                results
            }
            Err(e) => {
                warn!(provider = provider.name(), query = query, error = %e, "Search query failed");
                Vec::new()
            }
        }
    }
}

/// First occurrence of each id wins
fn dedupe_by_id(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

fn requested_keys(ctx: &SearchContext<'_>, override_hit: bool) -> Vec<String> {
    let mut keys = vec![normalize(&ctx.catalog.title)];
    if let Some(original) = ctx.catalog.original_title.as_deref() {
        keys.push(normalize(original));
    }
    if override_hit {
        if let Some(title) = ctx.numbering.override_title.as_deref() {
            keys.push(normalize(title));
        }
    }
    keys.retain(|k| !k.is_empty());
    keys
}

/// Keep candidates whose normalized title contains one of the keys.
/// Only this direction is checked: short requested titles are substrings
/// of many unrelated longer titles. With no usable key nothing is dropped.
fn filter_by_title(candidates: Vec<Candidate>, keys: &[String]) -> Vec<Candidate> {
    if keys.is_empty() {
        return candidates;
    }

    candidates
        .into_iter()
        .filter(|c| {
            let title = normalize(&c.title);
            keys.iter().any(|k| title.contains(k.as_str()))
        })
        .collect()
}
