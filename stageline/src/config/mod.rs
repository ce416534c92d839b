//! Configuration for stageline.
//!
//! Settings are read from an INI file (`~/.stageline/config.ini` by default)
//! and overlaid on built-in defaults:
//!
//! ```ini
//! [dispatcher]
//! name = ingest
//! timeout_ms = 30000
//!
//! [logging]
//! directory = logs
//! file = stageline.log
//! filter = info
//! ```
//!
//! Settings structs live in `settings`, constants in `defaults`, parsing
//! in `parser` and serialization in `writer`.

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    DEFAULT_DISPATCHER_NAME, DEFAULT_LOG_DIRECTORY, DEFAULT_LOG_FILE, DEFAULT_LOG_FILTER,
    DEFAULT_TIMEOUT_MS,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, DispatcherSettings, LoggingSettings};
