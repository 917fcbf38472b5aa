//! Candidate ranker
//!
//! Stable multi-key ordering of search candidates. Ties on every key keep
//! the search order, which the episode matcher relies on.

use regex::Regex;
use std::cmp::Reverse;

use crate::models::{Candidate, CandidateKind, CatalogRef, ResolvedNumbering};
use crate::services::normalize::normalize;

lazy_static::lazy_static! {
    static ref PART_NUMBER: Regex = Regex::new(r"(?i)\bpart\s*(\d+)\b").unwrap();
}

/// Season-number patterns for one request
struct SeasonPatterns {
    patterns: Vec<Regex>,
}

impl SeasonPatterns {
    fn new(title: &str, season: u32) -> Self {
        if season == 0 {
            return Self {
                patterns: Vec::new(),
            };
        }

        let sources = [
            format!(r"(?i)\bseason\s*{}\b", season),
            format!(r"(?i)\b{}(?:st|nd|rd|th)\s+season\b", season),
            format!(r"(?i)\bpart\s*{}\b", season),
            format!(r"(?i){}\W*{}\s*$", regex::escape(title.trim()), season),
        ];

        Self {
            patterns: sources.iter().filter_map(|p| Regex::new(p).ok()).collect(),
        }
    }

    fn hits(&self, title: &str) -> usize {
        self.patterns.iter().filter(|p| p.is_match(title)).count()
    }
}

/// Part number from "part N"; titles without one rank after every part
fn part_rank(title: &str) -> u32 {
    PART_NUMBER
        .captures(title)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(u32::MAX)
}

/// Order candidates by estimated correctness.
///
/// Keys, most significant first:
/// 1. override title containment, either direction (override active only)
/// 2. season name containment, unless the name is just "specials"
/// 3. more season-number pattern hits
/// 4. lower part number, no part marker last
/// 5. TV before any other kind
/// 6. shorter title
pub fn rank_candidates(
    mut candidates: Vec<Candidate>,
    catalog: &CatalogRef,
    numbering: &ResolvedNumbering,
) -> Vec<Candidate> {
    let override_key = numbering
        .override_title
        .as_deref()
        .map(normalize)
        .filter(|k| !k.is_empty());
    let season_key = numbering
        .season_name
        .as_deref()
        .map(normalize)
        .filter(|k| !k.is_empty() && k != "specials");
    let patterns = SeasonPatterns::new(&catalog.title, numbering.season);

    candidates.sort_by_cached_key(|c| {
        let key = normalize(&c.title);
        let override_match = override_key
            .as_ref()
            .map_or(false, |o| key.contains(o.as_str()) || o.contains(key.as_str()));
        let season_match = season_key
            .as_ref()
            .map_or(false, |s| key.contains(s.as_str()));

        (
            !override_match,
            !season_match,
            Reverse(patterns.hits(&c.title)),
            part_rank(&c.title),
            c.kind != CandidateKind::Tv,
            c.title.chars().count(),
        )
    });

    candidates
}
