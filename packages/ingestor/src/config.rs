//! Ingestor Configuration
//!
//! Defaults suit the Airtel Money (Zambia) feed. Every field can be
//! overridden from the environment with `SMS_INGEST_*` variables.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::filter::{FilterMode, TrustedSenderPolicy, DEFAULT_TRUSTED_SENDERS};
use crate::publisher::{DEFAULT_STREAM_KEY, DEFAULT_UI_CHANNEL};

/// Default look-back window of an on-demand scan
pub const DEFAULT_SCAN_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Default row cap of an on-demand scan
pub const DEFAULT_SCAN_LIMIT: usize = 500;

/// Default Redis endpoint
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

pub const ENV_TRUSTED_SENDERS: &str = "SMS_INGEST_TRUSTED_SENDERS";
pub const ENV_KEYWORD_FILTER: &str = "SMS_INGEST_KEYWORD_FILTER";
pub const ENV_SCAN_MAX_AGE_SECS: &str = "SMS_INGEST_SCAN_MAX_AGE_SECS";
pub const ENV_SCAN_LIMIT: &str = "SMS_INGEST_SCAN_LIMIT";
pub const ENV_REDIS_URL: &str = "SMS_INGEST_REDIS_URL";
pub const ENV_STREAM_KEY: &str = "SMS_INGEST_STREAM_KEY";
pub const ENV_UI_CHANNEL: &str = "SMS_INGEST_UI_CHANNEL";

/// Errors raised while reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Configuration for the ingestor and its sinks
#[derive(Debug, Clone, PartialEq)]
pub struct IngestorConfig {
    /// Initial trusted-sender patterns
    pub trusted_senders: Vec<String>,
    /// Rules applied after the sender match
    pub filter_mode: FilterMode,
    /// Oldest message an on-demand scan considers, `None` for no bound
    pub scan_max_age: Option<Duration>,
    /// Most rows an on-demand scan considers, `None` for no bound
    pub scan_limit: Option<usize>,
    /// Redis endpoint for the bundled sinks
    pub redis_url: String,
    /// Stream the transaction store appends to
    pub stream_key: String,
    /// Pub/sub channel for UI events
    pub ui_channel: String,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            trusted_senders: DEFAULT_TRUSTED_SENDERS.iter().map(|s| s.to_string()).collect(),
            filter_mode: FilterMode::default(),
            scan_max_age: Some(Duration::from_secs(DEFAULT_SCAN_MAX_AGE_SECS)),
            scan_limit: Some(DEFAULT_SCAN_LIMIT),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            ui_channel: DEFAULT_UI_CHANNEL.to_string(),
        }
    }
}

impl IngestorConfig {
    /// Create a config trusting the given senders
    pub fn with_trusted_senders<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_senders: senders.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn scan_bounds(mut self, max_age: Option<Duration>, limit: Option<usize>) -> Self {
        self.scan_max_age = max_age;
        self.scan_limit = limit;
        self
    }

    /// Policy built from `trusted_senders`
    pub fn policy(&self) -> TrustedSenderPolicy {
        TrustedSenderPolicy::new(self.trusted_senders.iter().cloned())
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Defaults overridden by the given variables
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = vars.get(ENV_TRUSTED_SENDERS) {
            config.trusted_senders = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = vars.get(ENV_KEYWORD_FILTER) {
            config.filter_mode = if parse_bool(ENV_KEYWORD_FILTER, value)? {
                FilterMode::SenderAndKeywords
            } else {
                FilterMode::SenderOnly
            };
        }

        if let Some(value) = vars.get(ENV_SCAN_MAX_AGE_SECS) {
            let secs: u64 = parse_number(ENV_SCAN_MAX_AGE_SECS, value)?;
            config.scan_max_age = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(value) = vars.get(ENV_SCAN_LIMIT) {
            let limit: usize = parse_number(ENV_SCAN_LIMIT, value)?;
            config.scan_limit = (limit > 0).then_some(limit);
        }

        if let Some(value) = vars.get(ENV_REDIS_URL) {
            config.redis_url = value.clone();
        }
        if let Some(value) = vars.get(ENV_STREAM_KEY) {
            config.stream_key = value.clone();
        }
        if let Some(value) = vars.get(ENV_UI_CHANNEL) {
            config.ui_channel = value.clone();
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}
