use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// HTTP and site configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Federation home page; its navigation bar links every season.
    #[serde(default = "default_home_url")]
    pub home_url: String,

    /// Results site serving the listings, relative links are joined onto it.
    #[serde(default = "default_data_url")]
    pub data_url: String,

    #[serde(default = "default_client")]
    pub client: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Preferred size of the body chunks handed to the extractor.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_language")]
    pub language: String,
}

/// Listing and nested page fetch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Rows requested per events page (10, 20 or 50).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Nested task `i` waits `i * nested_delay_ms` before its request.
    #[serde(default)]
    pub nested_delay_ms: u64,

    #[serde(default)]
    pub nested_jitter_ms: u64,

    /// Keep fetched elements for reuse by nested fetches.
    #[serde(default = "default_true")]
    pub cache_pages: bool,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_format")]
    pub format: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_home_url() -> String {
    "https://www.svemo.se".to_string()
}
fn default_data_url() -> String {
    "https://ta.svemo.se".to_string()
}
fn default_client() -> String {
    "reqwest".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "svemo-scraper/0.1 (speedway results research)".to_string()
}
fn default_chunk_size() -> usize {
    8 * 1024
}
fn default_language() -> String {
    "sv-se".to_string()
}
fn default_page_size() -> u32 {
    50
}
fn default_page_limit() -> usize {
    5
}
fn default_concurrency() -> usize {
    4
}
fn default_true() -> bool {
    true
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_format() -> String {
    "json".to_string()
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SVEMO").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            fetch: FetchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            home_url: default_home_url(),
            data_url: default_data_url(),
            client: default_client(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            chunk_size: default_chunk_size(),
            language: default_language(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_limit: default_page_limit(),
            concurrency: default_concurrency(),
            nested_delay_ms: 0,
            nested_jitter_ms: 0,
            cache_pages: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: default_format(),
        }
    }
}
