//! Pipeline configuration.
//!
//! Each stage gets its own concurrency ceiling and queue bound; nothing is
//! shared between stages. Values can come from code, from serialized config
//! or from `GENFLOW_*` environment variables.

use crate::core::StageKind;
use crate::errors::ConfigError;
use crate::pipeline::FailureMode;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the fetch concurrency.
pub const ENV_FETCH_CONCURRENCY: &str = "GENFLOW_FETCH_CONCURRENCY";
/// Environment variable overriding the transform concurrency.
pub const ENV_TRANSFORM_CONCURRENCY: &str = "GENFLOW_TRANSFORM_CONCURRENCY";
/// Environment variable overriding the persist concurrency.
pub const ENV_PERSIST_CONCURRENCY: &str = "GENFLOW_PERSIST_CONCURRENCY";
/// Environment variable selecting the failure mode.
pub const ENV_FAILURE_MODE: &str = "GENFLOW_FAILURE_MODE";

/// Configuration for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent source reads.
    pub fetch_concurrency: usize,
    /// Maximum concurrent transform invocations.
    pub transform_concurrency: usize,
    /// Maximum concurrent sequence drains.
    pub persist_concurrency: usize,
    /// Fetch queue bound. Defaults to `fetch_concurrency`.
    pub fetch_queue_capacity: Option<usize>,
    /// Transform queue bound. Defaults to `transform_concurrency`.
    pub transform_queue_capacity: Option<usize>,
    /// Persist queue bound. Defaults to `persist_concurrency`.
    pub persist_queue_capacity: Option<usize>,
    /// What happens after the first failure.
    pub failure_mode: FailureMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: Self::DEFAULT_CONCURRENCY,
            transform_concurrency: Self::DEFAULT_CONCURRENCY,
            persist_concurrency: Self::DEFAULT_CONCURRENCY,
            fetch_queue_capacity: None,
            transform_queue_capacity: None,
            persist_queue_capacity: None,
            failure_mode: FailureMode::default(),
        }
    }
}

impl PipelineConfig {
    /// Default concurrency ceiling for every stage.
    pub const DEFAULT_CONCURRENCY: usize = 10;

    /// Creates a configuration with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the same concurrency for all three stages.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self.transform_concurrency = concurrency;
        self.persist_concurrency = concurrency;
        self
    }

    /// Sets the fetch concurrency.
    #[must_use]
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    /// Sets the transform concurrency.
    #[must_use]
    pub fn with_transform_concurrency(mut self, concurrency: usize) -> Self {
        self.transform_concurrency = concurrency;
        self
    }

    /// Sets the persist concurrency.
    #[must_use]
    pub fn with_persist_concurrency(mut self, concurrency: usize) -> Self {
        self.persist_concurrency = concurrency;
        self
    }

    /// Sets the queue bound of one stage.
    #[must_use]
    pub fn with_queue_capacity(mut self, stage: StageKind, capacity: usize) -> Self {
        match stage {
            StageKind::Fetch => self.fetch_queue_capacity = Some(capacity),
            StageKind::Transform => self.transform_queue_capacity = Some(capacity),
            StageKind::Persist => self.persist_queue_capacity = Some(capacity),
        }
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Returns the concurrency ceiling of a stage.
    #[must_use]
    pub fn concurrency(&self, stage: StageKind) -> usize {
        match stage {
            StageKind::Fetch => self.fetch_concurrency,
            StageKind::Transform => self.transform_concurrency,
            StageKind::Persist => self.persist_concurrency,
        }
    }

    /// Returns the queue bound of a stage.
    #[must_use]
    pub fn queue_capacity(&self, stage: StageKind) -> usize {
        let explicit = match stage {
            StageKind::Fetch => self.fetch_queue_capacity,
            StageKind::Transform => self.transform_queue_capacity,
            StageKind::Persist => self.persist_queue_capacity,
        };
        explicit.unwrap_or_else(|| self.concurrency(stage))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any concurrency or queue bound is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for stage in StageKind::ALL {
            if self.concurrency(stage) == 0 {
                return Err(ConfigError::NonPositive {
                    field: concurrency_field(stage),
                });
            }
            if self.queue_capacity(stage) == 0 {
                return Err(ConfigError::NonPositive {
                    field: queue_field(stage),
                });
            }
        }
        Ok(())
    }

    /// Builds a configuration from the defaults plus `GENFLOW_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or the result is invalid.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_FETCH_CONCURRENCY) {
            self.fetch_concurrency = parse_usize(ENV_FETCH_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_TRANSFORM_CONCURRENCY) {
            self.transform_concurrency = parse_usize(ENV_TRANSFORM_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_PERSIST_CONCURRENCY) {
            self.persist_concurrency = parse_usize(ENV_PERSIST_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_FAILURE_MODE) {
            self.failure_mode = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_FAILURE_MODE.to_string(),
                value,
            })?;
        }
        self.validate()?;
        Ok(self)
    }
}

const fn concurrency_field(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Fetch => "fetch_concurrency",
        StageKind::Transform => "transform_concurrency",
        StageKind::Persist => "persist_concurrency",
    }
}

const fn queue_field(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Fetch => "fetch_queue_capacity",
        StageKind::Transform => "transform_queue_capacity",
        StageKind::Persist => "persist_queue_capacity",
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
