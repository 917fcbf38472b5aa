//! Luluvid embed scraping
//!
//! Luluvid hands out embed pages rather than manifests. The manifest URL
//! sits in the player setup script as `sources:[{file:"..."}]`.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref SOURCES_FILE: Regex = Regex::new(r#"sources:\s*\[\{\s*file:\s*"([^"]+)""#).unwrap();
    static ref ANY_FILE: Regex = Regex::new(r#"file:\s*"([^"]+)""#).unwrap();
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Embed page request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Embed page returned HTTP {0}")]
    Status(u16),

    #[error("No manifest URL found in embed page")]
    ManifestNotFound,
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::Request(e) if e.is_timeout())
    }
}

/// Pull the manifest URL out of an embed page
pub fn extract_manifest_url(html: &str) -> Option<String> {
    SOURCES_FILE
        .captures(html)
        .or_else(|| ANY_FILE.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
}

/// Fetch the embed page once and return the manifest URL
pub async fn scrape_manifest(
    http: &Client,
    embed_url: &str,
    headers: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<String, ScrapeError> {
    let mut request = http.get(embed_url).timeout(timeout);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status(status.as_u16()));
    }

    let html = response.text().await?;
    let manifest = extract_manifest_url(&html).ok_or(ScrapeError::ManifestNotFound)?;
    tracing::debug!(embed = embed_url, manifest = %manifest, "Luluvid manifest extracted");
    Ok(manifest)
}
