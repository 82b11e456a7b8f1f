use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File, Source};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::document::submitter::PermitRelease;
use crate::error::{AppError, Result};
use crate::utils::time::TimeUnit;

pub const DEFAULT_API_URL: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";
const CONFIG_FILE: &str = "crpt-client";
const ENV_PREFIX: &str = "CRPT";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // General
    pub log_level: String,
    pub log_format: LogFormat,

    // Remote API
    pub api_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,

    // Rate limit: `request_limit` submissions per one `time_unit`
    pub request_limit: usize,
    pub time_unit: TimeUnit,
    pub permit_release: PermitRelease,

    // Used by the binary when no signature is passed on the command line
    pub signature: Option<String>,
}

impl Config {
    /// Defaults, then `crpt-client.{toml,yaml,json}` if present, then `CRPT_*`
    /// environment variables (a `.env` file is loaded first).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let loader = Self::defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Self::finish(loader)
    }

    /// Defaults overlaid with a single source.
    pub fn load_from<S>(source: S) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let loader = Self::defaults()?.add_source(source).build()?;
        Self::finish(loader)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = ConfigLoader::builder()
            .set_default("log_level", "info")?
            .set_default("log_format", "text")?
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("connect_timeout_ms", 2_000_i64)?
            .set_default("request_timeout_ms", 10_000_i64)?
            .set_default("request_limit", 10_i64)?
            .set_default("time_unit", "seconds")?
            .set_default("permit_release", "on_completion")?;
        Ok(builder)
    }

    fn finish(loader: ConfigLoader) -> Result<Self> {
        let config: Config = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_limit == 0 {
            return Err(AppError::InvalidConfiguration(
                "request_limit must be at least 1".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(AppError::InvalidConfiguration(
                "HTTP timeouts must be longer than zero".into(),
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Url> {
        let url = Url::parse(&self.api_url).map_err(|e| {
            AppError::InvalidConfiguration(format!("invalid api_url {:?}: {}", self.api_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AppError::InvalidConfiguration(format!(
                "api_url must use http or https, got {}",
                other
            ))),
        }
    }

    pub fn window(&self) -> Duration {
        self.time_unit.as_duration()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
