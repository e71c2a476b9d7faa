//! Process-wide document renderer settings.
//!
//! The renderer's shared worker and the page size assumed before a page is
//! measured are fixed for the life of the process. They are installed once
//! at startup with [`install`] and only read afterwards.

use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use citation_harness_core::mapper::{CoordinateMapper, MapperOptions};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub worker_url: Option<String>,
    pub mapper: MapperOptions,
}

impl RendererSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_url: config.render.worker_url.clone(),
            mapper: config.mapper_options(),
        }
    }
}

static SETTINGS: OnceLock<RendererSettings> = OnceLock::new();

/// Install the settings. Fails if settings were already installed.
pub fn install(settings: RendererSettings) -> Result<&'static RendererSettings> {
    SETTINGS
        .set(settings)
        .map_err(|_| anyhow!("renderer settings are already installed"))?;
    SETTINGS
        .get()
        .ok_or_else(|| anyhow!("renderer settings missing after install"))
}

pub fn settings() -> Option<&'static RendererSettings> {
    SETTINGS.get()
}

/// A mapper using the installed settings, or defaults before installation.
pub fn mapper() -> CoordinateMapper {
    settings()
        .map(|s| CoordinateMapper::new(s.mapper))
        .unwrap_or_default()
}
