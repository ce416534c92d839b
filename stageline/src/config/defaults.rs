//! Default values for all configuration settings.

use std::path::PathBuf;

use super::settings::*;

/// Default dispatcher name.
pub const DEFAULT_DISPATCHER_NAME: &str = "stageline";

/// Default timeout tick interval (30 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "stageline.log";

/// Default filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_DISPATCHER_NAME.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            file: DEFAULT_LOG_FILE.to_string(),
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
