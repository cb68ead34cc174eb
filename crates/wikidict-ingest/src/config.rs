//! Ingestion configuration
//!
//! Defaults, then `WIKIDICT_*` environment variables, then command line
//! flags applied by the binary through the builder.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::queue::default_capacity;

pub const DEFAULT_BASE_URL: &str = "https://dumps.wikimedia.org";
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;
const APP_DIR: &str = "wikidict";

/// Placeholder replaced by the source name in output paths
pub const SOURCE_PLACEHOLDER: &str = "<source>";

/// Configuration for one dictionary generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Dump server root
    pub base_url: String,

    /// Where downloaded dumps are cached
    pub cache_dir: PathBuf,

    /// Where dictionaries are written unless an explicit path is given
    pub data_dir: PathBuf,

    pub cache_enabled: bool,

    /// Items buffered between two pipeline stages
    pub queue_capacity: usize,

    /// Connection timeout in seconds (default: 30)
    pub connection_timeout_secs: u64,

    /// Longest silence on a response body in seconds (default: 300)
    ///
    /// Applies per read, so a multi-gigabyte transfer is never cut short
    /// while data keeps arriving.
    pub read_timeout_secs: u64,

    pub user_agent: String,
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_dir: app_dir(dirs::cache_dir()),
            data_dir: app_dir(dirs::data_dir()),
            cache_enabled: true,
            queue_capacity: default_capacity(),
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            user_agent: format!("wikidict-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IngestError::config(format!("{} has an invalid value '{}'", key, value))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Defaults overridden by `WIKIDICT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("WIKIDICT_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(dir) = std::env::var("WIKIDICT_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("WIKIDICT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(value) = std::env::var("WIKIDICT_CACHE") {
            config.cache_enabled = parse_flag(&value).ok_or_else(|| {
                IngestError::config(format!("WIKIDICT_CACHE has an invalid value '{}'", value))
            })?;
        }
        if let Some(capacity) = env_parse("WIKIDICT_QUEUE_CAPACITY")? {
            config.queue_capacity = capacity;
        }
        if let Some(secs) = env_parse("WIKIDICT_CONNECTION_TIMEOUT_SECS")? {
            config.connection_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("WIKIDICT_READ_TIMEOUT_SECS")? {
            config.read_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(IngestError::config("base URL cannot be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(IngestError::config(format!(
                "base URL must be http(s), got '{}'",
                self.base_url
            )));
        }
        if self.queue_capacity == 0 {
            return Err(IngestError::config("queue capacity must be greater than 0"));
        }
        if self.connection_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(IngestError::config("timeouts must be greater than 0"));
        }
        Ok(())
    }

    /// Default dictionary location for a source
    pub fn dictionary_path(&self, source: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", source))
    }
}

/// Expand the `<source>` placeholder in an output path template
pub fn resolve_output(template: &str, source: &str) -> PathBuf {
    PathBuf::from(template.replace(SOURCE_PLACEHOLDER, source))
}

/// Builder for IngestConfig
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    base: Option<IngestConfig>,
    base_url: Option<String>,
    cache_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    cache_enabled: Option<bool>,
    queue_capacity: Option<usize>,
    connection_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl IngestConfigBuilder {
    /// Start from an existing configuration instead of the defaults
    pub fn with_base(mut self, base: IngestConfig) -> Self {
        self.base = Some(base);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn connection_timeout_secs(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = Some(secs);
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<IngestConfig> {
        let base = self.base.unwrap_or_default();
        let config = IngestConfig {
            base_url: self.base_url.unwrap_or(base.base_url),
            cache_dir: self.cache_dir.unwrap_or(base.cache_dir),
            data_dir: self.data_dir.unwrap_or(base.data_dir),
            cache_enabled: self.cache_enabled.unwrap_or(base.cache_enabled),
            queue_capacity: self.queue_capacity.unwrap_or(base.queue_capacity),
            connection_timeout_secs: self
                .connection_timeout_secs
                .unwrap_or(base.connection_timeout_secs),
            read_timeout_secs: self.read_timeout_secs.unwrap_or(base.read_timeout_secs),
            user_agent: self.user_agent.unwrap_or(base.user_agent),
        };
        config.validate()?;
        Ok(config)
    }
}
