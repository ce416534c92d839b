//! INI serialization logic for converting `ConfigFile` → INI string.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[dispatcher]
; Name used in log output to tell dispatchers apart
name = {}
; Interval between timeout ticks in milliseconds (default: 30000).
; Callers still waiting when a tick fires are notified and released;
; the pipeline work itself keeps running.
timeout_ms = {}

[logging]
; Directory for the log file (created if missing)
directory = {}
; Log file name (cleared at startup)
file = {}
; Default filter when RUST_LOG is not set (e.g. info, debug, stageline=trace)
filter = {}
"#,
        config.dispatcher.name,
        config.dispatcher.timeout_ms,
        config.logging.directory.to_string_lossy(),
        config.logging.file,
        config.logging.filter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_config_parses_back() {
        let mut config = ConfigFile::default();
        config.dispatcher.name = "edge".to_string();
        config.dispatcher.timeout_ms = 1500;

        let content = to_config_string(&config);
        let ini = ini::Ini::load_from_str(&content).unwrap();
        let parsed = super::super::parser::parse_ini(&ini).unwrap();

        assert_eq!(parsed, config);
    }
}
