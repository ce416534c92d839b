//! Dispatcher configuration.
//!
//! This module contains the [`DispatcherConfig`] struct used by the builder.

use crate::config::{ConfigFile, DEFAULT_DISPATCHER_NAME, DEFAULT_TIMEOUT_MS};
use std::time::Duration;

/// Configuration for a dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Name attached to log events.
    pub name: String,

    /// Interval between timeout ticks.
    ///
    /// The first tick fires one full interval after admission. Waiters still
    /// queued at a tick are notified and released; the traversal continues.
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DISPATCHER_NAME.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl From<&ConfigFile> for DispatcherConfig {
    fn from(file: &ConfigFile) -> Self {
        Self {
            name: file.dispatcher.name.clone(),
            timeout: file.timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.name, "stageline");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_dispatcher_config_from_file() {
        let mut file = ConfigFile::default();
        file.dispatcher.name = "ingest".to_string();
        file.dispatcher.timeout_ms = 750;

        let config = DispatcherConfig::from(&file);

        assert_eq!(config.name, "ingest");
        assert_eq!(config.timeout, Duration::from_millis(750));
    }
}
