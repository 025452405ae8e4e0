//! Configuration management for substream
//!
//! This module defines the main `Config` struct and its sub-structs. Settings
//! are layered with `figment`: built-in defaults, then a `substream.toml`
//! file, then `SUBSTREAM_*` environment variables, then command-line flags.

use crate::cli::Cli;
use crate::noise::{default_patterns, NoiseFilter, DEFAULT_LITERALS};
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Config file read when `--config` is not given, if present.
pub const DEFAULT_CONFIG_FILE: &str = "substream.toml";

pub const DEFAULT_REALERT_THRESHOLD: u64 = 50;

/// Startup configuration problems. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    MissingConfigFile(PathBuf),
    #[error("domain filter file not found: {}", .0.display())]
    MissingDomainFile(PathBuf),
    #[error("Telegram notifications require both --telegram-id and --telegram-key")]
    IncompleteTelegramCredentials,
    #[error("realert_threshold must be greater than zero")]
    ZeroRealertThreshold,
    #[error("invalid noise rules: {0}")]
    InvalidNoiseRules(String),
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    pub network: NetworkConfig,
    pub filter: FilterConfig,
    pub noise: NoiseConfig,
    pub deduplication: DeduplicationConfig,
    pub output: OutputConfig,
    pub metrics: MetricsConfig,
}

/// Configuration for the certstream client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NetworkConfig {
    /// The URL of the certstream WebSocket server.
    pub certstream_url: String,
    /// Capacity of the queue between the client and the pipeline.
    pub queue_capacity: usize,
}

/// Registrable domains to restrict reporting to.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct FilterConfig {
    #[serde(default)]
    pub domains: Vec<String>,
    /// A file with one domain per line.
    #[serde(default)]
    pub domains_file: Option<PathBuf>,
}

/// Noise suppression rules.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NoiseConfig {
    /// Reject labels containing `www`.
    pub ignore_www: bool,
    /// Reject labels containing any of these substrings.
    pub literals: Vec<String>,
    /// Reject labels in which any of these regular expressions matches.
    pub patterns: Vec<String>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            ignore_www: true,
            literals: DEFAULT_LITERALS.iter().map(|s| s.to_string()).collect(),
            patterns: default_patterns(),
        }
    }
}

/// Where label counts are kept.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Forget everything on restart; each label is reported once.
    #[default]
    Memory,
    /// Persist counters and re-alert every `realert_threshold` sightings.
    Sqlite,
}

/// Configuration for deduplication.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeduplicationConfig {
    pub store: StoreKind,
    /// SQLite database file, used when `store = "sqlite"`.
    pub db_path: PathBuf,
    /// Re-alert every this many sightings (persistent store only).
    pub realert_threshold: u64,
}

/// The format for stdout output.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Configuration for output sinks.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Append newly found labels to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
    pub telegram: TelegramConfig,
}

/// Configuration for Telegram notifications.
#[derive(Deserialize, Serialize, Clone, PartialEq)]
pub struct TelegramConfig {
    pub enabled: bool,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub timeout_ms: u64,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("enabled", &self.enabled)
            .field("chat_id", &self.chat_id)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Configuration for metrics export.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on this address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Config {
    /// Loads the configuration, layering defaults, the TOML file, the
    /// environment and the command line, then validates it.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_file = match &cli.config {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingConfigFile(path.clone()).into())
            }
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            // e.g. SUBSTREAM_DEDUPLICATION__REALERT_THRESHOLD=100
            .merge(Env::prefixed("SUBSTREAM_").split("__"))
            .merge(cli.clone())
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.filter.domains_file {
            if !path.exists() {
                return Err(ConfigError::MissingDomainFile(path.clone()));
            }
        }

        let telegram = &self.output.telegram;
        if telegram.enabled {
            let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
            if !present(&telegram.chat_id) || !present(&telegram.bot_token) {
                return Err(ConfigError::IncompleteTelegramCredentials);
            }
        }

        if self.deduplication.realert_threshold == 0 {
            return Err(ConfigError::ZeroRealertThreshold);
        }

        NoiseFilter::from_config(&self.noise)
            .map_err(|e| ConfigError::InvalidNoiseRules(format!("{:#}", e)))?;
        Ok(())
    }

    /// True when a non-default re-alert threshold is set but the memory
    /// store, which never re-alerts, is selected.
    pub fn realert_threshold_ignored(&self) -> bool {
        self.deduplication.store == StoreKind::Memory
            && self.deduplication.realert_threshold != DEFAULT_REALERT_THRESHOLD
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            network: NetworkConfig {
                certstream_url: "wss://certstream.calidog.io/".to_string(),
                queue_capacity: 10_000,
            },
            filter: FilterConfig::default(),
            noise: NoiseConfig::default(),
            deduplication: DeduplicationConfig {
                store: StoreKind::Memory,
                db_path: PathBuf::from("substream.db"),
                realert_threshold: DEFAULT_REALERT_THRESHOLD,
            },
            output: OutputConfig {
                format: OutputFormat::Plain,
                file: None,
                telegram: TelegramConfig {
                    enabled: false,
                    chat_id: None,
                    bot_token: None,
                    api_base_url: "https://api.telegram.org".to_string(),
                    timeout_ms: 10_000,
                },
            },
            metrics: MetricsConfig::default(),
        }
    }
}
