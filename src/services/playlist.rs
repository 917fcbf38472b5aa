//! HLS playlist handling for the relay proxy
//!
//! Classifies upstream responses as playlist or segment, rewrites playlist
//! URIs into self-referencing proxy URLs and encodes the upstream headers
//! that travel with them.

use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use url::Url;

use crate::services::host_guard::{host_matches, HostGuard};

lazy_static! {
    static ref URI_ATTRIBUTE: Regex = Regex::new(r#"URI="([^"]*)""#).unwrap();
}

/// Manifest marker every HLS playlist starts with
const PLAYLIST_MARKER: &[u8] = b"#EXTM3U";

/// Bytes inspected when sniffing a response body
pub const SNIFF_LEN: usize = 64;

/// Path of the relay endpoint that rewritten URIs point at
pub const HLS_PROXY_PATH: &str = "/api/proxy/hls";

/// Path of the relay endpoint that scrapes Luluvid embeds first
pub const LULUVID_PROXY_PATH: &str = "/api/proxy/luluvid";

/// How an upstream response is relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Playlist,
    Segment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Playlist => "playlist",
            ResourceKind::Segment => "segment",
        }
    }
}

// ============ Classification ============

fn strip_bom_and_whitespace(prefix: &[u8]) -> &[u8] {
    let prefix = prefix.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(prefix);
    let start = prefix
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(prefix.len());
    &prefix[start..]
}

fn looks_textual(prefix: &[u8]) -> bool {
    !prefix.is_empty()
        && prefix
            .iter()
            .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace() || *b >= 0x80)
}

fn has_playlist_suffix(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".m3u8"))
        .unwrap_or_else(|_| url.to_ascii_lowercase().contains(".m3u8"))
}

/// Decide how to relay a response.
///
/// An explicit segment pattern always wins. Otherwise the `#EXTM3U` marker
/// in the first bytes decides, ahead of the declared content type. A
/// mpegurl content type or `.m3u8` path only counts when the body looks
/// like text.
pub fn classify(
    url: &str,
    content_type: Option<&str>,
    prefix: &[u8],
    segment_patterns: &[Regex],
) -> ResourceKind {
    if segment_patterns.iter().any(|p| p.is_match(url)) {
        return ResourceKind::Segment;
    }

    let body = strip_bom_and_whitespace(prefix);
    if body.starts_with(PLAYLIST_MARKER) {
        return ResourceKind::Playlist;
    }

    let declared = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("mpegurl"))
        .unwrap_or(false);
    if (declared || has_playlist_suffix(url)) && looks_textual(body) {
        return ResourceKind::Playlist;
    }

    ResourceKind::Segment
}

/// Compile the configured segment patterns, skipping invalid ones
pub fn compile_patterns(sources: &[String]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| match Regex::new(source) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %source, error = %e, "Ignoring invalid segment pattern");
                None
            }
        })
        .collect()
}

// ============ Headers ============

/// Encode upstream headers for the `headers` query parameter
pub fn encode_headers(headers: &BTreeMap<String, String>) -> String {
    let json = serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string());
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode the `headers` query parameter: base64url JSON, or raw JSON
pub fn decode_headers(raw: &str) -> Option<BTreeMap<String, String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .or_else(|_| URL_SAFE.decode(raw))
        .or_else(|_| STANDARD.decode(raw))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    let json = decoded.as_deref().unwrap_or(raw);
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let object = value.as_object()?;

    Some(
        object
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

/// Default Referer/Origin for hosts that refuse requests without them
pub fn host_profile(url: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_default();

    let origin = if host_matches(&host, "luluvid.com") {
        Some("https://luluvid.com")
    } else if host.split('.').any(|label| label.starts_with("vidmoly")) {
        Some("https://vidmoly.net")
    } else {
        None
    };

    if let Some(origin) = origin {
        headers.insert("Referer".to_string(), format!("{}/", origin));
        headers.insert("Origin".to_string(), origin.to_string());
    }
    headers
}

pub fn is_luluvid(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| host_matches(&h.to_ascii_lowercase(), "luluvid.com")))
        .unwrap_or(false)
}

// ============ Rewriting ============

/// Where rewritten URIs point, which headers they carry and which hosts
/// may be relayed
pub struct RewriteContext<'a> {
    pub base_url: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub guard: &'a HostGuard,
}

impl RewriteContext<'_> {
    fn proxy_prefix(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), HLS_PROXY_PATH)
    }

    fn is_proxied(&self, uri: &str) -> bool {
        uri.starts_with(&self.proxy_prefix()) || uri.starts_with(HLS_PROXY_PATH)
    }

    /// Absolute, proxied form of `uri`; `None` when it cannot be resolved
    fn rewrite_uri(&self, uri: &str, playlist_url: &Url) -> Option<String> {
        let uri = uri.trim();
        if uri.is_empty() {
            return None;
        }
        if self.is_proxied(uri) {
            return Some(uri.to_string());
        }

        let absolute = playlist_url.join(uri).ok()?;
        if !matches!(absolute.scheme(), "http" | "https") || !self.guard.allows(&absolute) {
            return None;
        }
        Some(proxy_url(self.base_url, absolute.as_str(), self.headers))
    }
}

/// Self-referencing proxy URL for an upstream resource
pub fn proxy_url(base_url: &str, target: &str, headers: &BTreeMap<String, String>) -> String {
    build_proxy_url(base_url, HLS_PROXY_PATH, target, headers)
}

/// Proxy URL handed to players: Luluvid embeds go through the scraping route
pub fn stream_proxy_url(base_url: &str, target: &str, headers: &BTreeMap<String, String>) -> String {
    let path = if is_luluvid(target) {
        LULUVID_PROXY_PATH
    } else {
        HLS_PROXY_PATH
    };
    build_proxy_url(base_url, path, target, headers)
}

fn build_proxy_url(
    base_url: &str,
    path: &str,
    target: &str,
    headers: &BTreeMap<String, String>,
) -> String {
    let mut url = format!(
        "{}{}?url={}",
        base_url.trim_end_matches('/'),
        path,
        urlencoding::encode(target)
    );
    if !headers.is_empty() {
        url.push_str("&headers=");
        url.push_str(&encode_headers(headers));
    }
    url
}

/// Rewrite every URI line and `URI="..."` attribute of a playlist.
///
/// Relative URIs resolve against `playlist_url`, the post-redirect
/// location. Comment lines without URI attributes, blank lines, already
/// proxied URIs, unresolvable URIs and URIs on refused hosts are kept as
/// they are. Line endings are preserved.
pub fn rewrite_playlist(text: &str, playlist_url: &Url, ctx: &RewriteContext<'_>) -> String {
    text.split('\n')
        .map(|line| {
            let (content, ending) = match line.strip_suffix('\r') {
                Some(stripped) => (stripped, "\r"),
                None => (line, ""),
            };
            let trimmed = content.trim();

            if trimmed.is_empty() {
                return line.to_string();
            }

            if trimmed.starts_with('#') {
                if !URI_ATTRIBUTE.is_match(content) {
                    return line.to_string();
                }
                let rewritten = URI_ATTRIBUTE.replace_all(content, |caps: &Captures| {
                    match ctx.rewrite_uri(&caps[1], playlist_url) {
                        Some(uri) => format!("URI=\"{}\"", uri),
                        None => caps[0].to_string(),
                    }
                });
                return format!("{}{}", rewritten, ending);
            }

            match ctx.rewrite_uri(trimmed, playlist_url) {
                Some(uri) => format!("{}{}", uri, ending),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
