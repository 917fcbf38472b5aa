use serde::{Deserialize, Serialize};

/// Kind of catalog entry being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    #[serde(alias = "tv")]
    Series,
}

impl Default for MediaKind {
    fn default() -> Self {
        Self::Series
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Series => write!(f, "series"),
        }
    }
}

/// Catalog entry supplied by the caller for one resolution request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRef {
    pub id: String,
    pub media_kind: MediaKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_minutes: Option<u32>,
}

/// A (season, episode) pair as the caller numbers it
#[derive(Debug, Clone)]
pub struct NumberingRequest {
    pub catalog: CatalogRef,
    pub requested_season: u32,
    pub requested_episode: u32,
}

/// One entry of a numbering scheme; `order` acts as the season index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub episode_count: u32,
}

/// Ordered season partitioning used to compute episode offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingGroup {
    pub entries: Vec<GroupEntry>,
}

impl NumberingGroup {
    pub fn new(mut entries: Vec<GroupEntry>) -> Self {
        entries.sort_by_key(|e| e.order);
        Self { entries }
    }

    /// Entry whose order equals the given season
    pub fn entry(&self, season: u32) -> Option<&GroupEntry> {
        self.entries.iter().find(|e| e.order == season)
    }

    /// Sum of episode counts of every entry with 0 < order < season
    pub fn offset_before(&self, season: u32) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.order > 0 && e.order < season)
            .fold(0u32, |acc, e| acc.saturating_add(e.episode_count))
    }
}

/// Canonical season summary from the metadata collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonSummary {
    pub season_number: u32,
    pub name: String,
    pub episode_count: u32,
}

/// Series metadata as returned by the metadata collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_minutes: Option<u32>,
    /// Canonical seasons, before any episode-group substitution
    pub seasons: Vec<SeasonSummary>,
    /// Alternate partitioning, already merged over the canonical seasons
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_group: Option<NumberingGroup>,
}

impl SeriesMetadata {
    /// Episode group when present, otherwise the per-season episode counts
    pub fn numbering_group(&self) -> NumberingGroup {
        if let Some(group) = &self.episode_group {
            if !group.entries.is_empty() {
                return group.clone();
            }
        }

        NumberingGroup::new(
            self.seasons
                .iter()
                .map(|s| GroupEntry {
                    order: s.season_number,
                    name: Some(s.name.clone()),
                    episode_count: s.episode_count,
                })
                .collect(),
        )
    }

    pub fn season(&self, number: u32) -> Option<&SeasonSummary> {
        self.seasons.iter().find(|s| s.season_number == number)
    }
}

/// Episode title listing entry from the metadata collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMeta {
    pub episode_number: u32,
    pub name: String,
}

/// Output of the numbering resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNumbering {
    pub season: u32,
    pub episode: u32,
    pub absolute_episode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
}

impl ResolvedNumbering {
    /// Caller's numbers taken verbatim
    pub fn uncorrected(season: u32, episode: u32) -> Self {
        Self {
            season,
            episode,
            absolute_episode: episode,
            override_title: None,
            season_name: None,
            episode_title: None,
        }
    }

    pub fn has_override(&self) -> bool {
        self.override_title.is_some()
    }
}
