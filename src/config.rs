//! Configuration loading and management.
//!
//! This module provides layered configuration for the exporter using
//! figment. Configuration is loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `/etc/otel-switch.toml` (optional)
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Prefixed environment variables (`OTEL_SWITCH_*`)
//!
//! Each backend gets its own independent, optional block. A missing block
//! means that backend is never constructed and exporting in its mode is a
//! no-op.
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `otlp.endpoint` | OTLP collector URL |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT` | `otlp.timeout` | Request timeout in ms |
//! | `OTEL_EXPORTER_OTLP_HEADERS` | `otlp.headers` | Comma-separated key=value pairs |
//!
//! Setting any of these enables the OTLP block even when no config file
//! mentions it. `OTEL_SWITCH_` variables take precedence.

use crate::mode::ExportMode;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/otel-switch.toml";
const ENV_PREFIX: &str = "OTEL_SWITCH_";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Main configuration for the switchable exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Export mode active at startup.
    pub mode: ExportMode,
    /// Stdout (debug) sink. Presence of the block enables the sink.
    pub stdout: Option<StdoutSinkConfig>,
    /// OTLP gRPC sink.
    pub otlp: Option<OtlpSinkConfig>,
    /// JSON-lines file sink.
    pub file: Option<FileSinkConfig>,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_otel_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));

        figment.extract()
    }

    /// Creates a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Stdout sink configuration.
///
/// The block's presence is the whole toggle; the debug sink has no knobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StdoutSinkConfig {}

/// OTLP gRPC sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtlpSinkConfig {
    /// Collector endpoint URL.
    pub endpoint: String,
    /// Request timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Additional gRPC metadata to send with each request.
    pub headers: HashMap<String, String>,
}

impl Default for OtlpSinkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
            headers: HashMap::new(),
        }
    }
}

/// File sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    /// File the sink appends JSON span batches to.
    pub path: PathBuf,
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the export mode active at startup.
    pub fn mode(mut self, mode: ExportMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enables the stdout debug sink.
    pub fn stdout(mut self) -> Self {
        self.config.stdout = Some(StdoutSinkConfig::default());
        self
    }

    /// Enables the OTLP sink and sets its collector endpoint.
    pub fn otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.otlp.get_or_insert_with(Default::default).endpoint = endpoint.into();
        self
    }

    /// Enables the OTLP sink and sets its request timeout.
    pub fn otlp_timeout(mut self, timeout: Duration) -> Self {
        self.config.otlp.get_or_insert_with(Default::default).timeout = timeout;
        self
    }

    /// Enables the OTLP sink and adds a gRPC metadata header.
    pub fn otlp_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .otlp
            .get_or_insert_with(Default::default)
            .headers
            .insert(key.into(), value.into());
        self
    }

    /// Enables the file sink writing to `path`.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file = Some(FileSinkConfig { path: path.into() });
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial OTLP config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialOtlpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
}

/// Partial config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_otlp_empty")]
    otlp: PartialOtlpConfig,
}

fn is_partial_otlp_empty(config: &PartialOtlpConfig) -> bool {
    config.endpoint.is_none() && config.timeout.is_none() && config.headers.is_empty()
}

fn standard_otel_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.otlp.endpoint = Some(endpoint);
    }

    if let Ok(timeout) = std::env::var("OTEL_EXPORTER_OTLP_TIMEOUT") {
        config.otlp.timeout = timeout.parse().ok();
    }

    if let Ok(headers_str) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        config.otlp.headers = parse_header_list(&headers_str);
    }

    Serialized::defaults(config)
}

/// Parses the OTLP headers env format: comma-separated `key=value` pairs.
fn parse_header_list(headers: &str) -> HashMap<String, String> {
    let mut parsed = HashMap::new();
    for pair in headers.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            parsed.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    parsed
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
