use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Built-in corrections, shipped with the binary
const BUILTIN_OVERRIDES: &str = include_str!("../../data/overrides.json");

/// Replacement search title and in-part episode number for one catalog episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEntry {
    pub search_title: String,
    pub episode: u32,
}

type SeasonOverrides = HashMap<u32, HashMap<u32, OverrideEntry>>;

/// catalog id -> season -> episode -> correction
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, SeasonOverrides>,
}

impl OverrideTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a table from its JSON form
    pub fn from_json(raw: &str) -> Result<Self> {
        let entries: HashMap<String, SeasonOverrides> =
            serde_json::from_str(raw).context("Invalid override table")?;
        Ok(Self { entries })
    }

    /// Built-in table, with the file at `extra_path` merged on top when given
    pub fn load(extra_path: Option<&str>) -> Result<Self> {
        let mut table = Self::from_json(BUILTIN_OVERRIDES)?;

        if let Some(path) = extra_path {
            let raw = std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("Failed to read override file {}", path))?;
            let extra = Self::from_json(&raw)?;
            tracing::info!(path = path, catalogs = extra.entries.len(), "Loaded extra overrides");
            table.merge(extra);
        }

        Ok(table)
    }

    /// Merge another table; its entries win on conflict
    pub fn merge(&mut self, other: OverrideTable) {
        for (catalog_id, seasons) in other.entries {
            let target = self.entries.entry(catalog_id).or_default();
            for (season, episodes) in seasons {
                target.entry(season).or_default().extend(episodes);
            }
        }
    }

    pub fn lookup(&self, catalog_id: &str, season: u32, episode: u32) -> Option<&OverrideEntry> {
        self.entries.get(catalog_id)?.get(&season)?.get(&episode)
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(|seasons| seasons.values())
            .map(|episodes| episodes.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
