use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{CatalogRef, MediaKind, NumberingRequest};
use crate::services::metrics::record_resolve;
use crate::services::playlist::{proxy_url, stream_proxy_url};
use crate::services::resolver::{Resolution, StreamMatch};
use crate::AppState;

/// Query parameters for stream resolution
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveQuery {
    #[serde(default)]
    pub catalog_id: String,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub year: Option<u16>,
}

impl ResolveQuery {
    fn into_request(self) -> NumberingRequest {
        NumberingRequest {
            catalog: CatalogRef {
                id: self.catalog_id.trim().to_string(),
                media_kind: self.media_kind.unwrap_or_default(),
                title: self.title.trim().to_string(),
                original_title: self
                    .original_title
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
                year: self.year,
                runtime_minutes: None,
            },
            requested_season: self.season.unwrap_or(1),
            requested_episode: self.episode.unwrap_or(1),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub default: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub provider: String,
    /// Proxied URL for players
    pub url: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    pub subtitles: Vec<SubtitleResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInfo {
    pub candidate_id: String,
    pub candidate_title: String,
    pub episode_id: String,
    pub episode_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    pub season: u32,
    pub episode: u32,
    pub absolute_episode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_info: Option<EpisodeInfo>,
}

impl ResolveResponse {
    fn from_resolution(resolution: Resolution, base_url: &str) -> Self {
        let Resolution { numbering, found } = resolution;
        let Some(StreamMatch {
            provider,
            candidate,
            episode,
            stream,
        }) = found
        else {
            return Self {
                matched: false,
                stream: None,
                episode_info: None,
            };
        };

        let headers = &stream.descriptor.headers;
        let subtitles = stream
            .subtitles
            .into_iter()
            .map(|track| SubtitleResponse {
                url: proxy_url(base_url, &track.url, headers),
                label: track.label,
                default: track.default,
            })
            .collect();

        Self {
            matched: true,
            stream: Some(StreamResponse {
                provider,
                url: stream_proxy_url(base_url, &stream.descriptor.url, headers),
                source_url: stream.descriptor.url.clone(),
                quality: stream.quality,
                subtitles,
            }),
            episode_info: Some(EpisodeInfo {
                candidate_id: candidate.id,
                candidate_title: candidate.title,
                episode_id: episode.id,
                episode_number: episode.number,
                episode_title: episode.title.or(numbering.episode_title),
                season: numbering.season,
                episode: numbering.episode,
                absolute_episode: numbering.absolute_episode,
                season_name: numbering.season_name,
                override_title: numbering.override_title,
            }),
        }
    }
}

/// GET /api/resolve?catalogId=&mediaKind=&season=&episode=&title=
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, (StatusCode, Json<serde_json::Value>)> {
    if query.catalog_id.trim().is_empty() || query.title.trim().is_empty() {
        record_resolve("invalid");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "catalogId and title are required" })),
        ));
    }

    let request = query.into_request();
    tracing::debug!(
        catalog_id = %request.catalog.id,
        media_kind = %request.catalog.media_kind,
        season = request.requested_season,
        episode = request.requested_episode,
        "Resolve request"
    );

    let resolution = state.resolver.resolve(&request).await;
    record_resolve(if resolution.is_matched() {
        "matched"
    } else {
        "unmatched"
    });

    Ok(Json(ResolveResponse::from_resolution(
        resolution,
        &state.config.base_url,
    )))
}
