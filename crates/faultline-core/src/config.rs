//! Configuration for faultline
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`FAULTLINE_*`)
//! 2. TOML file passed to [`FaultlineConfig::load`]
//! 3. Compiled defaults
//!
//! Every section is optional; missing values fall back to defaults.

use crate::advisor::Sampler;
use crate::collector::DEFAULT_CAPACITY;
use crate::error::ConfigError;
use crate::event::Severity;
use crate::remediation::{Intent, RemediationPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    /// Error history
    pub history: HistoryConfig,
    /// Scope defaults
    pub scopes: ScopeConfig,
    /// Advisor sampling
    pub advisor: AdvisorConfig,
    /// Severity to remediation overrides
    pub remediation: RemediationConfig,
}

/// History collector settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of events retained
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Scope timeout and deadline defaults
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Timeout layer duration in seconds
    pub timeout_secs: u64,
    /// Finer timeout override in milliseconds
    pub timeout_ms: Option<u64>,
    /// Absolute deadline for deadline layers
    pub deadline: Option<DateTime<Utc>>,
    /// Horizon used for deadline layers when no absolute deadline is set
    pub deadline_horizon_secs: u64,
}

impl ScopeConfig {
    /// Timeout applied by timeout layers
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.timeout_secs),
        }
    }

    /// Deadline applied by a deadline layer created now
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline.unwrap_or_else(|| {
            i64::try_from(self.deadline_horizon_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|horizon| Utc::now().checked_add_signed(horizon))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// With absolute deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            timeout_ms: None,
            deadline: None,
            deadline_horizon_secs: 300,
        }
    }
}

/// Advisor settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Samples per cycle for dynamic advice
    pub frequency: u32,
    /// Cycles considered by dynamic advice
    pub cycles: usize,
    /// Consult the advisor on every report
    pub advise_on_report: bool,
}

impl AdvisorConfig {
    /// Sampling parameters for advisors
    #[inline]
    #[must_use]
    pub fn sampler(&self) -> Sampler {
        Sampler {
            frequency: self.frequency,
            cycles: self.cycles,
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        let sampler = Sampler::default();
        Self {
            frequency: sampler.frequency,
            cycles: sampler.cycles,
            advise_on_report: false,
        }
    }
}

/// Per-severity remediation overrides, e.g. `critical = "retry"`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Overrides applied on top of the default policy, severity name to intent name
    pub policy: BTreeMap<String, String>,
}

impl RemediationConfig {
    /// Default policy with overrides applied
    ///
    /// Unknown names are skipped with a warning; [`FaultlineConfig::validate`]
    /// rejects them up front.
    #[must_use]
    pub fn policy(&self) -> RemediationPolicy {
        self.policy
            .iter()
            .fold(RemediationPolicy::default(), |policy, (severity, intent)| {
                match (severity.parse::<Severity>(), intent.parse::<Intent>()) {
                    (Ok(severity), Ok(intent)) => policy.with(severity, intent),
                    _ => {
                        tracing::warn!(%severity, %intent, "skipping unknown remediation override");
                        policy
                    }
                }
            })
    }
}

impl FaultlineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With history capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.history.capacity = capacity;
        self
    }

    /// With scope settings
    #[inline]
    #[must_use]
    pub fn with_scopes(mut self, scopes: ScopeConfig) -> Self {
        self.scopes = scopes;
        self
    }

    /// With advice on every report
    #[inline]
    #[must_use]
    pub fn with_advise_on_report(mut self, enabled: bool) -> Self {
        self.advisor.advise_on_report = enabled;
        self
    }

    /// Load a TOML file, apply environment overrides and validate
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if it is not valid TOML for this schema
    /// - `ConfigError::Validation` if a value is out of range
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.apply_env_overrides();
        config.validate()?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` or `ConfigError::Validation`.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FAULTLINE_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Some(capacity) = env_parse::<usize>("FAULTLINE_HISTORY_CAPACITY") {
            self.history.capacity = capacity;
        }
        if let Some(secs) = env_parse::<u64>("FAULTLINE_SCOPE_TIMEOUT_SECS") {
            self.scopes.timeout_secs = secs;
            self.scopes.timeout_ms = None;
        }
        if let Some(enabled) = env_parse::<bool>("FAULTLINE_ADVISE_ON_REPORT") {
            self.advisor.advise_on_report = enabled;
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.capacity == 0 {
            return Err(ConfigError::Validation {
                field: "history.capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (severity, intent) in &self.remediation.policy {
            if let Err(e) = severity.parse::<Severity>() {
                return Err(ConfigError::Validation {
                    field: format!("remediation.policy.{severity}"),
                    message: e.to_string(),
                });
            }
            if let Err(e) = intent.parse::<Intent>() {
                return Err(ConfigError::Validation {
                    field: format!("remediation.policy.{severity}"),
                    message: e.to_string(),
                });
            }
        }
        if self.advisor.frequency == 0 {
            return Err(ConfigError::Validation {
                field: "advisor.frequency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
