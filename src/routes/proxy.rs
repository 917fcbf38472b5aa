use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::services::luluvid::{scrape_manifest, ScrapeError};
use crate::services::metrics::record_proxy;
use crate::services::playlist::{
    classify, decode_headers, host_profile, rewrite_playlist, ResourceKind, RewriteContext,
    SNIFF_LEN,
};
use crate::AppState;

// Re-export reqwest header module to avoid version conflicts
mod reqwest_header {
    pub use reqwest::header::{
        HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, RANGE,
        USER_AGENT,
    };
}

/// Upstream headers relayed on segment responses
const FORWARDED_HEADERS: &[&str] = &[
    "content-length",
    "content-range",
    "cache-control",
    "accept-ranges",
    "etag",
    "last-modified",
];

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

type ProxyError = (StatusCode, Json<serde_json::Value>);

/// Query parameters for HLS proxy
#[derive(Deserialize)]
pub struct HlsProxyQuery {
    #[serde(default)]
    pub url: String,
    /// Upstream headers, base64url JSON or raw JSON
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
}

/// Query parameters for the Luluvid embed proxy
#[derive(Deserialize)]
pub struct LuluvidQuery {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Option<String>,
}

/// 403 unless the host guard admits the target
fn check_target(state: &AppState, url: &str) -> Result<(), ProxyError> {
    if state.host_guard.allows_str(url) {
        return Ok(());
    }
    tracing::warn!(url = url, "Refusing to relay disallowed host");
    Err(proxy_error(
        StatusCode::FORBIDDEN,
        "URL not allowed",
        format!("host of {} is not allowed", url),
    ))
}

fn proxy_error(status: StatusCode, error: &str, detail: String) -> ProxyError {
    record_proxy("error", status.as_u16());
    (
        status,
        Json(serde_json::json!({ "error": error, "detail": detail })),
    )
}

/// Guess content type from URL
fn guess_content_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains(".m3u8") {
        PLAYLIST_CONTENT_TYPE
    } else if lower.contains(".mp4") || lower.contains(".m4s") {
        "video/mp4"
    } else if lower.contains(".aac") {
        "audio/aac"
    } else if lower.contains(".vtt") {
        "text/vtt"
    } else {
        "video/MP2T"
    }
}

/// Validate URL is HTTP/HTTPS
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Host profile defaults, overlaid by the `headers` param and the legacy `referer`
fn carried_headers(
    url: &str,
    encoded: Option<&str>,
    referer: Option<&str>,
) -> BTreeMap<String, String> {
    let mut headers = host_profile(url);
    if let Some(decoded) = encoded.and_then(decode_headers) {
        headers.extend(decoded);
    }
    if let Some(referer) = referer.filter(|r| !r.is_empty()) {
        headers.insert("Referer".to_string(), referer.to_string());
    }
    headers
}

/// Headers sent upstream: UA and Accept defaults, carried headers, inbound Range
fn upstream_headers(
    carried: &BTreeMap<String, String>,
    inbound: &HeaderMap,
    user_agent: &str,
) -> reqwest_header::HeaderMap {
    let mut headers = reqwest_header::HeaderMap::new();

    if let Ok(ua) = reqwest_header::HeaderValue::from_str(user_agent) {
        headers.insert(reqwest_header::USER_AGENT, ua);
    }

    let accept = inbound
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*/*");
    if let Ok(accept) = reqwest_header::HeaderValue::from_str(accept) {
        headers.insert(reqwest_header::ACCEPT, accept);
    }

    for (name, value) in carried {
        match (
            reqwest_header::HeaderName::from_bytes(name.as_bytes()),
            reqwest_header::HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "Skipping invalid upstream header"),
        }
    }

    // Forward Range header for partial content requests
    if let Some(range) = inbound.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        if let Ok(range) = reqwest_header::HeaderValue::from_str(range) {
            headers.insert(reqwest_header::RANGE, range);
        }
    }

    headers
}

fn cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Length, Content-Type, Content-Range, Accept-Ranges"),
    );
}

fn forward_header(upstream: &reqwest_header::HeaderMap, name: &'static str, out: &mut HeaderMap) {
    if let Some(value) = upstream.get(name).and_then(|v| v.to_str().ok()) {
        if let Ok(parsed) = HeaderValue::from_str(value) {
            out.insert(HeaderName::from_static(name), parsed);
        }
    }
}

/// Logs when the client goes away before the segment body finished
struct DisconnectGuard {
    url: String,
    completed: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::debug!(url = %self.url, "Client disconnected, upstream segment dropped");
        }
    }
}

/// GET /api/proxy/hls?url=<encoded>&headers=<b64 json>&referer=<optional>
/// Relays HLS playlists (rewritten to point back here) and segments (streamed).
pub async fn hls_proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HlsProxyQuery>,
    inbound: HeaderMap,
) -> Result<Response, ProxyError> {
    // Validate URL
    if query.url.is_empty() || !is_valid_http_url(&query.url) {
        return Err(proxy_error(
            StatusCode::BAD_REQUEST,
            "Invalid url parameter",
            format!("expected an http(s) URL, got {:?}", query.url),
        ));
    }

    let carried = carried_headers(
        &query.url,
        query.headers.as_deref(),
        query.referer.as_deref(),
    );
    relay(&state, &query.url, carried, &inbound).await
}

/// GET /api/proxy/luluvid?url=<embed page>&headers=<b64 json>
/// Scrapes the embed page for its manifest, then relays it like `hls_proxy`.
pub async fn luluvid_proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LuluvidQuery>,
    inbound: HeaderMap,
) -> Result<Response, ProxyError> {
    if query.url.is_empty() || !is_valid_http_url(&query.url) {
        return Err(proxy_error(
            StatusCode::BAD_REQUEST,
            "Invalid url parameter",
            format!("expected an http(s) URL, got {:?}", query.url),
        ));
    }

    check_target(&state, &query.url)?;

    let mut carried = host_profile("https://luluvid.com/");
    if let Some(decoded) = query.headers.as_deref().and_then(decode_headers) {
        carried.extend(decoded);
    }

    let mut page_headers = carried.clone();
    page_headers
        .entry("User-Agent".to_string())
        .or_insert_with(|| state.config.user_agent.clone());

    let manifest = scrape_manifest(
        &state.http,
        &query.url,
        &page_headers,
        Duration::from_millis(state.config.hls_proxy_connect_timeout_ms),
    )
    .await
    .map_err(|e| {
        tracing::error!("Luluvid scrape failed for {}: {}", query.url, e);
        let status = match &e {
            // Client errors on the embed page keep their status
            ScrapeError::Status(code) if (400..500).contains(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        proxy_error(status, "Failed to resolve Luluvid embed", e.to_string())
    })?;

    relay(&state, &manifest, carried, &inbound).await
}

async fn relay(
    state: &AppState,
    target: &str,
    carried: BTreeMap<String, String>,
    inbound: &HeaderMap,
) -> Result<Response, ProxyError> {
    check_target(state, target)?;
    let request_headers = upstream_headers(&carried, inbound, &state.config.user_agent);

    // Execute request
    let upstream = state
        .http
        .get(target)
        .headers(request_headers)
        .send()
        .await
        .map_err(|e| {
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            tracing::error!("HLS proxy error for {}: {}", target, e);
            proxy_error(status, "Failed to proxy HLS", e.to_string())
        })?;

    let upstream_status = upstream.status();
    if upstream_status.is_server_error() {
        tracing::error!("Upstream {} answered {}", target, upstream_status);
        return Err(proxy_error(
            StatusCode::BAD_GATEWAY,
            "Upstream error",
            upstream_status.to_string(),
        ));
    }

    let status = StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::OK);
    let final_url = upstream.url().clone();
    let response_headers = upstream.headers().clone();
    let content_type = response_headers
        .get(reqwest_header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut body = Box::pin(upstream.bytes_stream());

    // Sniff the first bytes
    let mut prefix: Vec<Bytes> = Vec::new();
    let mut sniffed = 0;
    while sniffed < SNIFF_LEN {
        match body.next().await {
            Some(Ok(chunk)) => {
                sniffed += chunk.len();
                prefix.push(chunk);
            }
            Some(Err(e)) => {
                tracing::error!("HLS proxy read error for {}: {}", target, e);
                return Err(proxy_error(
                    StatusCode::BAD_GATEWAY,
                    "Failed to read upstream body",
                    e.to_string(),
                ));
            }
            None => break,
        }
    }
    let head: Vec<u8> = prefix
        .iter()
        .flat_map(|chunk| chunk.iter().copied())
        .take(SNIFF_LEN)
        .collect();

    let kind = if status.is_client_error() {
        ResourceKind::Segment
    } else {
        classify(
            final_url.as_str(),
            content_type.as_deref(),
            &head,
            &state.segment_patterns,
        )
    };
    tracing::debug!(
        url = %final_url,
        kind = kind.as_str(),
        status = status.as_u16(),
        "Upstream response classified"
    );

    if kind == ResourceKind::Playlist {
        let limit = state.config.max_playlist_bytes();
        let declared_len = response_headers
            .get(reqwest_header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared_len.map(|len| len > limit).unwrap_or(false) {
            return Err(proxy_error(
                StatusCode::BAD_GATEWAY,
                "Playlist too large",
                format!("limit is {} bytes", limit),
            ));
        }

        let mut buffer: Vec<u8> = prefix.iter().flat_map(|c| c.iter().copied()).collect();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::error!("HLS proxy read error for {}: {}", target, e);
                proxy_error(
                    StatusCode::BAD_GATEWAY,
                    "Failed to read upstream body",
                    e.to_string(),
                )
            })?;
            buffer.extend_from_slice(&chunk);
            if buffer.len() > limit {
                return Err(proxy_error(
                    StatusCode::BAD_GATEWAY,
                    "Playlist too large",
                    format!("limit is {} bytes", limit),
                ));
            }
        }

        let text = String::from_utf8_lossy(&buffer);
        let ctx = RewriteContext {
            base_url: &state.config.base_url,
            headers: &carried,
            guard: &state.host_guard,
        };
        let rewritten = rewrite_playlist(&text, &final_url, &ctx);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        cors_headers(&mut headers);

        record_proxy(kind.as_str(), StatusCode::OK.as_u16());
        let mut response = Response::new(Body::from(rewritten));
        *response.headers_mut() = headers;
        return Ok(response);
    }

    // Build response headers
    let mut headers = HeaderMap::new();
    let content_type = content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(guess_content_type(final_url.as_str())));
    headers.insert(header::CONTENT_TYPE, content_type);
    for &name in FORWARDED_HEADERS {
        forward_header(&response_headers, name, &mut headers);
    }
    cors_headers(&mut headers);

    // Stream the body back, sniffed bytes first
    let url = final_url.to_string();
    let stream = async_stream::stream! {
        let mut guard = DisconnectGuard { url, completed: false };
        for chunk in prefix {
            yield Ok::<Bytes, reqwest::Error>(chunk);
        }
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => {
                    tracing::warn!(url = %guard.url, error = %e, "Upstream segment stream failed");
                    yield Err(e);
                    break;
                }
            }
        }
        guard.completed = true;
    };

    record_proxy(kind.as_str(), status.as_u16());
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;
    use url::Url;

    use crate::routes::test_support::test_app;
    use crate::services::playlist::encode_headers;

    /// Local upstream on an ephemeral port; `routes` receives its base URL
    async fn spawn_upstream(routes: impl FnOnce(String) -> Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let router = routes(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        base
    }

    fn upstream_routes(base: String) -> Router {
        let embed = format!(
            r#"<script>jwplayer("v").setup({{sources: [{{file:"{}/hls/index.m3u8"}}]}});</script>"#,
            base
        );
        Router::new()
            .route(
                "/hls/index.m3u8",
                get(|| async {
                    (
                        [("content-type", "text/plain")],
                        "#EXTM3U\n#EXTINF:4.0,\nseg1.ts\n",
                    )
                }),
            )
            .route("/redirect", get(|| async { Redirect::temporary("/other/index.m3u8") }))
            .route(
                "/other/index.m3u8",
                get(|| async { "#EXTM3U\n#EXTINF:4.0,\nchunk.ts\n" }),
            )
            .route(
                "/video/seg1.ts",
                get(|| async { ([("content-type", "video/mp2t")], vec![0x47u8; 1000]) }),
            )
            .route(
                "/broken",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "gone").into_response() }),
            )
            .route(
                "/echo.m3u8",
                get(|headers: HeaderMap| async move {
                    let referer = headers
                        .get("referer")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string();
                    format!("#EXTM3U\n# referer={}\n", referer)
                }),
            )
            .route(
                "/huge.m3u8",
                get(|| async { format!("#EXTM3U\n{}", "#".repeat(2 * 1024 * 1024)) }),
            )
            .route("/e/abc", get(move || async move { embed }))
            .route(
                "/e/gone",
                get(|| async { (StatusCode::NOT_FOUND, "gone").into_response() }),
            )
            .route(
                "/range.ts",
                get(|headers: HeaderMap| async move {
                    match headers.get("range").and_then(|v| v.to_str().ok()) {
                        Some("bytes=0-99") => (
                            StatusCode::PARTIAL_CONTENT,
                            [
                                ("content-type", "video/mp2t"),
                                ("content-range", "bytes 0-99/1000"),
                            ],
                            vec![0x47u8; 100],
                        )
                            .into_response(),
                        _ => ([("content-type", "video/mp2t")], vec![0x47u8; 1000]).into_response(),
                    }
                }),
            )
            .route(
                "/mixed.m3u8",
                get(|| async { "#EXTM3U\nseg1.ts\nhttp://169.254.169.254/latest/meta-data\n" }),
            )
            .route(
                "/to-metadata",
                get(|| async { Redirect::temporary("http://169.254.169.254/latest/meta-data/") }),
            )
    }

    /// Fires when the upstream drops its response body
    struct UpstreamDropped(Option<tokio::sync::oneshot::Sender<()>>);

    impl Drop for UpstreamDropped {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    fn proxy_uri(path: &str, target: &str) -> String {
        format!("{}?url={}", path, urlencoding::encode(target))
    }

    async fn call(uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let app = test_app(Vec::new());
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn target_of(proxied: &str) -> String {
        Url::parse(proxied)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_playlist_with_wrong_content_type_is_rewritten() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, headers, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/hls/index.m3u8", base))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], PLAYLIST_CONTENT_TYPE);
        let text = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert!(lines[2].starts_with("http://gateway.test/api/proxy/hls?url="));
        assert_eq!(target_of(lines[2]), format!("{}/hls/seg1.ts", base));
    }

    #[tokio::test]
    async fn test_relative_uris_resolve_against_redirect_target() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/redirect", base))).await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        let segment = text.lines().nth(2).unwrap();
        assert_eq!(target_of(segment), format!("{}/other/chunk.ts", base));
    }

    #[tokio::test]
    async fn test_segment_bytes_stream_through() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, headers, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/video/seg1.ts", base))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "video/mp2t");
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(body.len(), 1000);
        assert!(body.iter().all(|b| *b == 0x47));
    }

    #[tokio::test]
    async fn test_upstream_server_error_becomes_bad_gateway() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/broken", base))).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["detail"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_upstream_client_error_is_forwarded() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/missing", base))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(&body[..], b"gone");
    }

    #[tokio::test]
    async fn test_connection_refused_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (status, _, _) =
            call(&proxy_uri("/api/proxy/hls", &format!("http://{}/x.m3u8", addr))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let (status, _, _) = call("/api/proxy/hls?url=ftp%3A%2F%2Fhost%2Fa.m3u8").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = call("/api/proxy/hls").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_headers_param_reaches_upstream() {
        let base = spawn_upstream(upstream_routes).await;
        let carried = BTreeMap::from([("Referer".to_string(), "https://site.example/".to_string())]);
        let uri = format!(
            "{}&headers={}",
            proxy_uri("/api/proxy/hls", &format!("{}/echo.m3u8", base)),
            encode_headers(&carried)
        );

        let (status, _, body) = call(&uri).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# referer=https://site.example/"));
    }

    #[tokio::test]
    async fn test_legacy_referer_param_overrides_headers() {
        let base = spawn_upstream(upstream_routes).await;
        let uri = format!(
            "{}&referer={}",
            proxy_uri("/api/proxy/hls", &format!("{}/echo.m3u8", base)),
            urlencoding::encode("https://legacy.example/")
        );

        let (_, _, body) = call(&uri).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# referer=https://legacy.example/"));
    }

    #[tokio::test]
    async fn test_oversized_playlist_is_rejected() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, _) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/huge.m3u8", base))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_luluvid_embed_is_scraped_then_relayed() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, headers, body) =
            call(&proxy_uri("/api/proxy/luluvid", &format!("{}/e/abc", base))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], PLAYLIST_CONTENT_TYPE);
        let text = String::from_utf8(body.to_vec()).unwrap();
        let segment = text.lines().nth(2).unwrap();
        assert_eq!(target_of(segment), format!("{}/hls/seg1.ts", base));

        let carried = Url::parse(segment)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "headers")
            .and_then(|(_, v)| decode_headers(&v))
            .unwrap();
        assert_eq!(carried["Referer"], "https://luluvid.com/");
    }

    #[tokio::test]
    async fn test_luluvid_embed_client_error_keeps_status() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, _) =
            call(&proxy_uri("/api/proxy/luluvid", &format!("{}/e/gone", base))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disallowed_hosts_are_forbidden() {
        let (status, _, body) =
            call(&proxy_uri("/api/proxy/hls", "http://169.254.169.254/latest/meta-data/")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "URL not allowed");

        let (status, _, _) = call(&proxy_uri("/api/proxy/luluvid", "http://localhost:1/e/abc")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_redirect_to_disallowed_host_is_not_followed() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, _) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/to-metadata", base))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_playlist_uris_on_disallowed_hosts_stay_unproxied() {
        let base = spawn_upstream(upstream_routes).await;
        let (status, _, body) =
            call(&proxy_uri("/api/proxy/hls", &format!("{}/mixed.m3u8", base))).await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(target_of(lines[1]), format!("{}/seg1.ts", base));
        assert_eq!(lines[2], "http://169.254.169.254/latest/meta-data");
    }

    #[tokio::test]
    async fn test_range_is_forwarded_and_partial_content_relayed() {
        let base = spawn_upstream(upstream_routes).await;
        let request = Request::get(proxy_uri("/api/proxy/hls", &format!("{}/range.ts", base)))
            .header("range", "bytes=0-99")
            .body(Body::empty())
            .unwrap();
        let response = test_app(Vec::new()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()["content-range"], "bytes 0-99/1000");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_dropping_segment_body_releases_upstream_stream() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let slot = Arc::new(std::sync::Mutex::new(Some(tx)));
        let base = spawn_upstream(move |_| {
            Router::new().route(
                "/live/endless.ts",
                get(move || {
                    let signal = UpstreamDropped(slot.lock().unwrap().take());
                    async move {
                        let body = async_stream::stream! {
                            let _signal = signal;
                            loop {
                                yield Ok::<Bytes, std::io::Error>(Bytes::from(vec![0x47u8; 188]));
                                tokio::time::sleep(Duration::from_millis(10)).await;
                            }
                        };
                        ([("content-type", "video/mp2t")], Body::from_stream(body))
                    }
                }),
            )
        })
        .await;

        let request = Request::get(proxy_uri("/api/proxy/hls", &format!("{}/live/endless.ts", base)))
            .body(Body::empty())
            .unwrap();
        let response = test_app(Vec::new()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        drop(body);

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("upstream body still alive")
            .unwrap();
    }
}
