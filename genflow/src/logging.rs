//! Logging initialization.
//!
//! The library only emits `tracing` events; binaries, benchmarks and
//! ad-hoc tools call [`init_logging`] once to install a subscriber.
//!
//! # Example
//!
//! ```no_run
//! use genflow::logging::{init_logging, LogConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = LogConfig::from_env()?;
//! init_logging(&config)?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the filter directives (e.g. `genflow=debug`).
pub const ENV_LOG: &str = "GENFLOW_LOG";
/// Environment variable selecting the output format.
pub const ENV_LOG_FORMAT: &str = "GENFLOW_LOG_FORMAT";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {s}")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Whether to include target module names.
    pub include_targets: bool,
    /// Whether to include thread ids.
    pub include_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
            include_targets: true,
            include_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Loads the configuration from `GENFLOW_LOG` and `GENFLOW_LOG_FORMAT`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(filter) = lookup(ENV_LOG) {
            self.filter = filter;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .with_context(|| format!("Failed to parse log filter '{}'", self.filter))
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(config.include_targets)
                    .with_thread_ids(config.include_thread_ids),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.include_targets)
                    .with_thread_ids(config.include_thread_ids),
            )
            .try_init(),
    }
    .context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let config = LogConfig::default()
            .with_overrides(|key| match key {
                ENV_LOG => Some("genflow=debug".to_string()),
                ENV_LOG_FORMAT => Some("JSON".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.filter, "genflow=debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = LogConfig::default()
            .with_overrides(|key| (key == ENV_LOG_FORMAT).then(|| "xml".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_filter_rejected() {
        let config = LogConfig::new().with_filter("genflow=notalevel");
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::new().with_filter("warn").with_format(LogFormat::Json);
        // Another test may have installed a subscriber first; either way the
        // second call must fail.
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
