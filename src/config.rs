use anyhow::{Context, Result};
use citation_harness_core::aggregator::PaginationOptions;
use citation_harness_core::mapper::{CornerPolicy, MapperOptions, DEFAULT_PAGE_SIZE};
use citation_harness_core::models::PageSize;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_page_width")]
    pub default_page_width: f64,
    #[serde(default = "default_page_height")]
    pub default_page_height: f64,
    #[serde(default)]
    pub normalize_corners: bool,
    /// Script URL of the document renderer's shared worker.
    #[serde(default)]
    pub worker_url: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_page_width: default_page_width(),
            default_page_height: default_page_height(),
            normalize_corners: false,
            worker_url: None,
        }
    }
}

fn default_page_width() -> f64 {
    DEFAULT_PAGE_SIZE.width
}
fn default_page_height() -> f64 {
    DEFAULT_PAGE_SIZE.height
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_size")]
    pub initial_top_k: usize,
    #[serde(default = "default_dedup")]
    pub dedup_across_pages: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            initial_top_k: default_page_size(),
            dedup_across_pages: default_dedup(),
        }
    }
}

fn default_page_size() -> usize {
    10
}
fn default_dedup() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

impl Config {
    pub fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            default_page: PageSize::new(
                self.render.default_page_width,
                self.render.default_page_height,
            ),
            corner_policy: if self.render.normalize_corners {
                CornerPolicy::Normalize
            } else {
                CornerPolicy::Trust
            },
        }
    }

    pub fn pagination_options(&self) -> PaginationOptions {
        PaginationOptions {
            page_size: self.pagination.page_size,
            initial_top_k: self.pagination.initial_top_k,
            dedup_across_pages: self.pagination.dedup_across_pages,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!("config file {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    let page = PageSize::new(
        config.render.default_page_width,
        config.render.default_page_height,
    );
    if !page.is_usable() {
        anyhow::bail!("render.default_page_width and default_page_height must be > 0");
    }

    if config.pagination.page_size == 0 {
        anyhow::bail!("pagination.page_size must be > 0");
    }
    if config.pagination.initial_top_k == 0 {
        anyhow::bail!("pagination.initial_top_k must be > 0");
    }

    if !config.backend.url.starts_with("http://") && !config.backend.url.starts_with("https://") {
        anyhow::bail!(
            "backend.url must be an http(s) URL, got '{}'",
            config.backend.url
        );
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    Ok(())
}
