//! Atom configuration.

use crate::error::AtomError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// App version written into persisted records when none is configured.
pub const DEFAULT_APP_VERSION: &str = "1";

/// How concurrent `update` calls are admitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Commit every update in submission order.
    #[default]
    Queue,
    /// Drop updates while an earlier one inside the window is pending.
    Throttle,
    /// Supersede pending updates inside the window with the newest one.
    Debounce,
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyPolicy::Queue => write!(f, "queue"),
            ConcurrencyPolicy::Throttle => write!(f, "throttle"),
            ConcurrencyPolicy::Debounce => write!(f, "debounce"),
        }
    }
}

impl FromStr for ConcurrencyPolicy {
    type Err = AtomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(ConcurrencyPolicy::Queue),
            "throttle" => Ok(ConcurrencyPolicy::Throttle),
            "debounce" => Ok(ConcurrencyPolicy::Debounce),
            other => Err(AtomError::InvalidConfig(format!(
                "unknown concurrency policy '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the update scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AtomConfig {
    /// Admission policy for concurrent updates.
    pub concurrency: ConcurrencyPolicy,
    /// Suppression window for throttle/debounce. `None` means unbounded.
    pub window: Option<Duration>,
}

impl AtomConfig {
    /// Check whether `age` still falls inside the configured window.
    pub fn within_window(&self, age: Duration) -> bool {
        self.window.map_or(true, |window| age <= window)
    }
}

/// Builder for atom configuration.
pub struct AtomConfigBuilder {
    config: AtomConfig,
}

impl AtomConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AtomConfig::default(),
        }
    }

    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.config.concurrency = policy;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = Some(window);
        self
    }

    pub fn window_ms(self, ms: u64) -> Self {
        self.window(Duration::from_millis(ms))
    }

    pub fn build(self) -> AtomConfig {
        self.config
    }
}

impl Default for AtomConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Where and under which schema version an atom persists its state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistConfig {
    /// Store key holding the persisted record.
    pub key: String,
    /// Schema version; stored records with another version are discarded.
    pub app_version: String,
}

impl PersistConfig {
    /// Persist under `key` with the default app version.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            app_version: DEFAULT_APP_VERSION.to_string(),
        }
    }

    /// Set the schema version.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = AtomConfigBuilder::new()
            .concurrency(ConcurrencyPolicy::Debounce)
            .window_ms(250)
            .build();

        assert_eq!(config.concurrency, ConcurrencyPolicy::Debounce);
        assert_eq!(config.window, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_default_window_is_unbounded() {
        let config = AtomConfig::default();
        assert_eq!(config.concurrency, ConcurrencyPolicy::Queue);
        assert!(config.within_window(Duration::from_secs(3600)));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let config = AtomConfigBuilder::new().window_ms(100).build();
        assert!(config.within_window(Duration::from_millis(100)));
        assert!(!config.within_window(Duration::from_millis(101)));
    }

    #[test]
    fn test_policy_parse_and_display() {
        for policy in [
            ConcurrencyPolicy::Queue,
            ConcurrencyPolicy::Throttle,
            ConcurrencyPolicy::Debounce,
        ] {
            assert_eq!(policy.to_string().parse::<ConcurrencyPolicy>().unwrap(), policy);
        }
        assert_eq!(" Throttle ".parse::<ConcurrencyPolicy>().unwrap(), ConcurrencyPolicy::Throttle);
        assert!("fifo".parse::<ConcurrencyPolicy>().is_err());
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&ConcurrencyPolicy::Debounce).unwrap();
        assert_eq!(json, "\"debounce\"");
    }

    #[test]
    fn test_persist_config() {
        let config = PersistConfig::new("settings").app_version("2");
        assert_eq!(config.key, "settings");
        assert_eq!(config.app_version, "2");
        assert_eq!(PersistConfig::new("k").app_version, DEFAULT_APP_VERSION);
    }
}
