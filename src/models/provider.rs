use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind hint a provider attaches to a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Tv,
    Movie,
    Ova,
    Ona,
    Special,
    Unknown,
}

impl Default for CandidateKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl CandidateKind {
    /// Map a free-form provider label ("TV", "Movie", "OVA"...) to a kind
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "tv" | "series" | "tv series" | "show" => CandidateKind::Tv,
            "movie" | "film" => CandidateKind::Movie,
            "ova" | "oav" => CandidateKind::Ova,
            "ona" => CandidateKind::Ona,
            "special" | "specials" | "tv special" => CandidateKind::Special,
            _ => CandidateKind::Unknown,
        }
    }
}

/// Provider search result that may correspond to the requested entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub kind: CandidateKind,
}

/// Episode listed by a provider for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeRef {
    pub id: String,
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Playable URL plus the headers the origin expects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Subtitle track reported alongside a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// Stream lookup result from a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub descriptor: StreamDescriptor,
    #[serde(default)]
    pub subtitles: Vec<SubtitleTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}
