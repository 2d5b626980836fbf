//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Default separator between the registry prefix and a hook's short name.
pub const DEFAULT_SEPARATOR: &str = "_";

/// Default cap on iterations of a single drain loop.
pub const DEFAULT_DRAIN_LIMIT: usize = 1_000;

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Namespace prepended to every hook name. Empty means no namespace.
    pub prefix: String,
    /// Joins the prefix and the short name.
    pub separator: String,
    /// Maximum number of occurrences a single drain removes before giving up.
    pub drain_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }
}

impl SchedulerConfig {
    /// Configuration namespaced under `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn drain_limit(mut self, limit: usize) -> Self {
        self.drain_limit = limit;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.drain_limit == 0 {
            return Err(SchedulerError::InvalidConfig(
                "drain_limit must be greater than zero".to_string(),
            ));
        }
        if !self.prefix.is_empty() && self.separator.is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "separator must not be empty when a prefix is set".to_string(),
            ));
        }
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(SchedulerError::InvalidConfig(format!(
                "prefix '{}' must not contain whitespace",
                self.prefix
            )));
        }
        Ok(())
    }
}
