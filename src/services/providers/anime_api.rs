//! Adapter for the anime-api JSON catalog
//!
//! Endpoints: `/search?keyword=`, `/episodes/{id}`,
//! `/stream?id=&ep=&server=&type=`. Payload shapes vary between
//! deployments, so the wire types accept both strings and numbers and
//! both object and bare-string stream links.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{ContentProvider, ProviderError};
use crate::models::{
    Candidate, CandidateKind, EpisodeRef, StreamDescriptor, StreamInfo, SubtitleTrack,
};

/// Separator between the anime id and the episode number in episode ids
const EPISODE_ID_SEPARATOR: &str = "::";

// ===== Wire types =====

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    results: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Flexible {
    Number(u64),
    Text(String),
}

impl Flexible {
    fn as_text(&self) -> String {
        match self {
            Flexible::Number(n) => n.to_string(),
            Flexible::Text(s) => s.clone(),
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Flexible::Number(n) => u32::try_from(*n).ok(),
            Flexible::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: Flexible,
    title: String,
    #[serde(default)]
    tv_info: Option<TvInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvInfo {
    #[serde(default)]
    show_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EpisodeResults {
    #[serde(default)]
    episodes: Vec<EpisodeItem>,
}

#[derive(Debug, Deserialize)]
struct EpisodeItem {
    #[serde(default)]
    number: Option<Flexible>,
    #[serde(default)]
    episode_no: Option<Flexible>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResults {
    streaming_link: Option<StreamingLink>,
}

#[derive(Debug, Deserialize)]
struct StreamingLink {
    link: Option<LinkField>,
    #[serde(default)]
    tracks: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LinkField {
    Object { file: String },
    Url(String),
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    file: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    default: bool,
}

// ===== Provider =====

/// Settings for one anime-api deployment
#[derive(Debug, Clone)]
pub struct AnimeApiConfig {
    pub base_url: String,
    pub server: String,
    pub audio: String,
    pub referer: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

pub struct AnimeApiProvider {
    http: Client,
    config: AnimeApiConfig,
}

impl AnimeApiProvider {
    pub fn new(config: AnimeApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        debug!(provider = "anime-api", path = path, "Provider request");

        let response = self
            .http
            .get(self.endpoint(path))
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;

        match envelope.results {
            Some(results) if envelope.success => Ok(results),
            _ => Err(ProviderError::NotFound(path.to_string())),
        }
    }
}

fn split_episode_id(episode_id: &str) -> Result<(&str, &str), ProviderError> {
    episode_id
        .split_once(EPISODE_ID_SEPARATOR)
        .filter(|(anime, ep)| !anime.is_empty() && !ep.is_empty())
        .ok_or_else(|| ProviderError::InvalidId(episode_id.to_string()))
}

fn convert_episodes(anime_id: &str, items: Vec<EpisodeItem>) -> Vec<EpisodeRef> {
    items
        .into_iter()
        .filter_map(|item| {
            let number = item.number.as_ref().and_then(Flexible::as_u32)?;
            let episode_no = item
                .episode_no
                .as_ref()
                .map(Flexible::as_text)
                .unwrap_or_else(|| number.to_string());

            Some(EpisodeRef {
                id: format!("{}{}{}", anime_id, EPISODE_ID_SEPARATOR, episode_no),
                number,
                title: item.title,
            })
        })
        .collect()
}

#[async_trait]
impl ContentProvider for AnimeApiProvider {
    fn name(&self) -> &str {
        "anime-api"
    }

    async fn search(&self, query: &str) -> Result<Vec<Candidate>, ProviderError> {
        let results: SearchResults = match self.get("/search", &[("keyword", query)]).await {
            Ok(results) => results,
            // An unsuccessful envelope just means nothing matched
            Err(ProviderError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(results
            .data
            .into_iter()
            .map(|item| Candidate {
                id: item.id.as_text(),
                title: item.title,
                kind: item
                    .tv_info
                    .and_then(|info| info.show_type)
                    .map(|label| CandidateKind::from_label(&label))
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn episodes(&self, candidate_id: &str) -> Result<Vec<EpisodeRef>, ProviderError> {
        let results: EpisodeResults = self
            .get(&format!("/episodes/{}", urlencoding::encode(candidate_id)), &[])
            .await?;

        Ok(convert_episodes(candidate_id, results.episodes))
    }

    async fn stream(&self, episode_id: &str) -> Result<StreamInfo, ProviderError> {
        let (anime_id, episode_no) = split_episode_id(episode_id)?;

        let results: StreamResults = self
            .get(
                "/stream",
                &[
                    ("id", anime_id),
                    ("ep", episode_no),
                    ("server", self.config.server.as_str()),
                    ("type", self.config.audio.as_str()),
                ],
            )
            .await?;

        let link = results
            .streaming_link
            .ok_or_else(|| ProviderError::NotFound(format!("stream {}", episode_id)))?;

        let url = match link.link {
            Some(LinkField::Object { file }) | Some(LinkField::Url(file)) if !file.is_empty() => {
                file
            }
            _ => return Err(ProviderError::NotFound(format!("stream {}", episode_id))),
        };

        let mut headers = BTreeMap::new();
        if let Some(referer) = &self.config.referer {
            headers.insert("Referer".to_string(), referer.clone());
        }

        let subtitles = link
            .tracks
            .into_iter()
            .filter(|t| t.kind.as_deref().map_or(true, |k| k == "captions" || k == "subtitles"))
            .map(|t| SubtitleTrack {
                url: t.file,
                label: t.label,
                default: t.default,
            })
            .collect();

        Ok(StreamInfo {
            descriptor: StreamDescriptor { url, headers },
            subtitles,
            quality: Some("HD".to_string()),
        })
    }
}
