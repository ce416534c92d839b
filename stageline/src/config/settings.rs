//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Dispatcher settings
    pub dispatcher: DispatcherSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// `[dispatcher]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Name used in log fields to tell dispatchers apart
    pub name: String,
    /// Interval between timeout ticks, in milliseconds.
    /// Waiters still queued when a tick fires are told to stop waiting.
    pub timeout_ms: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for the log file
    pub directory: PathBuf,
    /// Log file name, truncated at startup
    pub file: String,
    /// Default filter directive when RUST_LOG is unset
    pub filter: String,
}
