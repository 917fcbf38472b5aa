use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub app_env: String,
    pub base_url: String,

    // Cache
    pub cache_backend: String,
    pub redis_url: String,
    pub cache_max_entries: usize,
    pub cache_sweep_interval_secs: u64,
    pub search_cache_ttl_secs: u64,
    pub episodes_cache_ttl_secs: u64,
    pub metadata_cache_ttl_secs: u64,

    // Upstream timeouts
    pub metadata_timeout_ms: u64,
    pub search_timeout_ms: u64,

    // HLS Proxy
    pub hls_proxy_connect_timeout_ms: u64,
    pub max_playlist_mb: usize,
    pub segment_patterns: Vec<String>,
    pub allowed_hosts: Vec<String>,

    // Metadata (TMDB)
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: String,
    pub tmdb_language: String,

    // Providers
    pub anime_api_base: Option<String>,
    pub anime_api_server: String,
    pub anime_api_type: String,
    pub anime_api_referer: Option<String>,

    // Numbering overrides
    pub overrides_path: Option<String>,

    // Misc
    pub user_agent: String,
}

/// Default segment patterns: media chunk extensions never hold a playlist
const DEFAULT_SEGMENT_PATTERNS: &str = r"\.(ts|m4s|aac|mp4|m4a|vtt)(\?|$)";

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            base_url: env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),

            // Cache
            cache_backend: env::var("CACHE_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .to_lowercase(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            cache_max_entries: env::var("CACHE_MAX_ENTRIES")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            cache_sweep_interval_secs: env::var("CACHE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300), // 5 minutes
            search_cache_ttl_secs: env::var("SEARCH_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1800), // 30 minutes
            episodes_cache_ttl_secs: env::var("EPISODES_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "21600".to_string())
                .parse()
                .unwrap_or(21_600), // 6 hours
            metadata_cache_ttl_secs: env::var("METADATA_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86_400), // 24 hours

            // Upstream timeouts
            metadata_timeout_ms: env::var("METADATA_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            search_timeout_ms: env::var("SEARCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),

            // HLS Proxy
            hls_proxy_connect_timeout_ms: env::var("HLS_PROXY_CONNECT_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            max_playlist_mb: env::var("MAX_PLAYLIST_MB")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            // Semicolon separated regexes
            segment_patterns: env::var("SEGMENT_PATTERNS")
                .unwrap_or_else(|_| DEFAULT_SEGMENT_PATTERNS.to_string())
                .split(';')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),

            // Comma separated; empty relays any public host
            allowed_hosts: env::var("ALLOWED_HOSTS")
                .unwrap_or_default()
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),

            // Metadata (TMDB)
            tmdb_api_key: optional("TMDB_API_KEY"),
            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),
            tmdb_language: env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "en-US".to_string()),

            // Providers
            anime_api_base: optional("ANIME_API_BASE"),
            anime_api_server: env::var("ANIME_API_SERVER").unwrap_or_else(|_| "hd-2".to_string()),
            anime_api_type: env::var("ANIME_API_TYPE").unwrap_or_else(|_| "sub".to_string()),
            anime_api_referer: optional("ANIME_API_REFERER"),

            overrides_path: optional("OVERRIDES_PATH"),

            // Misc - browser user agent, some CDNs reject anything else
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
            }),
        }
    }

    pub fn max_playlist_bytes(&self) -> usize {
        self.max_playlist_mb.max(1) * 1024 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
