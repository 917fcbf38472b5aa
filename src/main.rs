mod config;
mod models;
mod routes;
mod services;

use anyhow::Context;
use axum::{routing::get, Router};
use regex::Regex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    cache::Cache,
    cleanup::{start_cleanup_task, CleanupConfig},
    host_guard::HostGuard,
    matcher::EpisodeMatcher,
    metadata::{CachedMetadataProvider, MetadataProvider, NoMetadata, TmdbProvider},
    numbering::NumberingResolver,
    overrides::OverrideTable,
    playlist::compile_patterns,
    providers::{AnimeApiConfig, AnimeApiProvider, ContentProvider},
    redis::RedisCache,
    resolver::StreamResolver,
    search::SearchOrchestrator,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub cache: Cache,
    pub resolver: StreamResolver,
    /// Upstream client for the relay proxy; connect timeout only, so long
    /// segment transfers are never cut short
    pub http: reqwest::Client,
    pub segment_patterns: Vec<Regex>,
    pub host_guard: HostGuard,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, cache: Cache, resolver: StreamResolver) -> anyhow::Result<Self> {
        let host_guard = HostGuard::new(&config.allowed_hosts);
        let redirect_guard = host_guard.clone();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.hls_proxy_connect_timeout_ms))
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= 10 {
                    attempt.error("too many redirects")
                } else if !redirect_guard.allows(attempt.url()) {
                    attempt.error("redirect target not allowed")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .context("Failed to create proxy HTTP client")?;
        let segment_patterns = compile_patterns(&config.segment_patterns);

        Ok(Self {
            config,
            cache,
            resolver,
            http,
            segment_patterns,
            host_guard,
            start_time: Instant::now(),
        })
    }
}

/// Cache backend from config; Redis falls back to memory when unreachable
async fn build_cache(config: &Config) -> Cache {
    if config.cache_backend == "redis" {
        match RedisCache::new(&config.redis_url, "streamgate:").await {
            Ok(redis) => {
                tracing::info!("Redis cache connected: {}", config.redis_url);
                return Cache::new(Arc::new(redis));
            }
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using memory cache", e);
            }
        }
    }

    tracing::info!("Memory cache initialized ({} entries max)", config.cache_max_entries);
    Cache::memory(config.cache_max_entries)
}

fn build_metadata(config: &Config, cache: &Cache) -> anyhow::Result<Arc<dyn MetadataProvider>> {
    let Some(api_key) = config.tmdb_api_key.as_deref() else {
        tracing::warn!("TMDB_API_KEY not set, numbering corrections disabled");
        return Ok(Arc::new(NoMetadata));
    };

    let tmdb = TmdbProvider::new(
        &config.tmdb_base_url,
        api_key,
        &config.tmdb_language,
        Duration::from_millis(config.metadata_timeout_ms),
    )?;

    Ok(Arc::new(CachedMetadataProvider::new(
        tmdb,
        cache.clone(),
        Duration::from_secs(config.metadata_cache_ttl_secs),
    )))
}

fn build_providers(config: &Config) -> anyhow::Result<Vec<Arc<dyn ContentProvider>>> {
    let mut providers: Vec<Arc<dyn ContentProvider>> = Vec::new();

    if let Some(base_url) = &config.anime_api_base {
        providers.push(Arc::new(AnimeApiProvider::new(AnimeApiConfig {
            base_url: base_url.clone(),
            server: config.anime_api_server.clone(),
            audio: config.anime_api_type.clone(),
            referer: config.anime_api_referer.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_millis(config.search_timeout_ms),
        })?));
    }

    if providers.is_empty() {
        tracing::warn!("No content providers configured, resolve will never match");
    }
    Ok(providers)
}

/// Build the HTTP router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Resolution
        .route("/api/resolve", get(routes::resolve::resolve))
        // HLS Proxy
        .route("/api/proxy/hls", get(routes::proxy::hls_proxy))
        .route("/api/proxy/luluvid", get(routes::proxy::luluvid_proxy))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamgate_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting StreamGate Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app_env);

    let cache = build_cache(&config).await;

    let overrides = OverrideTable::load(config.overrides_path.as_deref())?;
    tracing::info!("Numbering overrides loaded: {} entries", overrides.len());

    let metadata = build_metadata(&config, &cache)?;
    let providers = build_providers(&config)?;

    let resolver = StreamResolver::new(
        NumberingResolver::new(metadata, Arc::new(overrides)),
        SearchOrchestrator::new(
            cache.clone(),
            Duration::from_secs(config.search_cache_ttl_secs),
        ),
        EpisodeMatcher::new(
            cache.clone(),
            Duration::from_secs(config.episodes_cache_ttl_secs),
        ),
        providers,
    );
    tracing::info!("Providers: {:?}", resolver.provider_names());

    // Start cache sweep task (runs in background)
    tokio::spawn(start_cleanup_task(
        cache.clone(),
        CleanupConfig {
            interval_secs: config.cache_sweep_interval_secs,
        },
    ));

    // Build application state
    let state = Arc::new(AppState::new(config, cache, resolver)?);
    let app = build_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
