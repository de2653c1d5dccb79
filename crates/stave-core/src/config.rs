//! Engine configuration

use serde::{Deserialize, Serialize};
use stave_merge::ConflictPolicy;
use std::time::Duration;

/// What a second `stash()` does while the slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StashPolicy {
    /// The new stash replaces the old one
    Overwrite,
    /// The old stash is kept and the current dirty changes are discarded
    #[default]
    KeepExisting,
}

/// Version control configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    /// Author recorded when the caller gives none
    pub default_author: String,
    /// Same-field merge conflict policy
    pub conflict_policy: ConflictPolicy,
    /// Stash slot policy
    pub stash_policy: StashPolicy,
    /// Upper bound for each remote call, in seconds
    pub remote_timeout_secs: u64,
    /// Default tracing filter directive
    pub log_filter: String,
}

impl VcsConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML or a value is out of range
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns error if the remote timeout is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// With default author
    #[inline]
    #[must_use]
    pub fn with_default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }

    /// With conflict policy
    #[inline]
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// With stash policy
    #[inline]
    #[must_use]
    pub fn with_stash_policy(mut self, policy: StashPolicy) -> Self {
        self.stash_policy = policy;
        self
    }

    /// With remote timeout
    #[inline]
    #[must_use]
    pub fn with_remote_timeout_secs(mut self, secs: u64) -> Self {
        self.remote_timeout_secs = secs;
        self
    }

    /// With log filter
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Remote timeout as a duration
    #[inline]
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            default_author: String::from("Anonymous"),
            conflict_policy: ConflictPolicy::default(),
            stash_policy: StashPolicy::default(),
            remote_timeout_secs: 30,
            log_filter: String::from("info"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Remote calls need a positive timeout
    #[error("remote_timeout_secs must be greater than zero")]
    ZeroTimeout,
}
