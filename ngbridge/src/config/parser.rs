//! INI parsing: `Ini` → `BridgeConfig`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;

use super::{BridgeConfig, ConfigError, MAX_DEBOUNCE_MS};

/// Parse an `Ini` object into a `BridgeConfig`.
///
/// Starts from `BridgeConfig::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::default();

    // [draw] section
    if let Some(section) = ini.section(Some("draw")) {
        if let Some(v) = section.get("debounce_ms") {
            let ms: u64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                section: "draw".to_string(),
                key: "debounce_ms".to_string(),
                value: v.to_string(),
                reason: "must be a whole number of milliseconds".to_string(),
            })?;
            if ms > MAX_DEBOUNCE_MS {
                return Err(ConfigError::InvalidValue {
                    section: "draw".to_string(),
                    key: "debounce_ms".to_string(),
                    value: v.to_string(),
                    reason: format!("must be at most {}", MAX_DEBOUNCE_MS),
                });
            }
            config.draw.debounce = Duration::from_millis(ms);
        }
    }

    // [notify] section
    if let Some(section) = ini.section(Some("notify")) {
        if let Some(v) = section.get("scratch_path") {
            let v = v.trim();
            if !v.is_empty() && !v.contains("://") {
                return Err(ConfigError::InvalidValue {
                    section: "notify".to_string(),
                    key: "scratch_path".to_string(),
                    value: v.to_string(),
                    reason: "must be a catalog URI such as ngc://tmp".to_string(),
                });
            }
            config.notify.scratch_path = v.to_string();
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Expand `~` to the home directory in paths.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<BridgeConfig, ConfigError> {
        parse_ini(&Ini::load_from_str(content).unwrap())
    }

    #[test]
    fn test_empty_ini_is_default() {
        assert_eq!(parse("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_debounce_bounds() {
        assert_eq!(
            parse("[draw]\ndebounce_ms = 0\n").unwrap().draw.debounce,
            Duration::ZERO
        );
        assert!(parse("[draw]\ndebounce_ms = -5\n").is_err());
        assert!(matches!(
            parse("[draw]\ndebounce_ms = 600000\n"),
            Err(ConfigError::InvalidValue { key, .. }) if key == "debounce_ms"
        ));
    }

    #[test]
    fn test_empty_scratch_path_disables_filter() {
        let config = parse("[notify]\nscratch_path =\n").unwrap();
        assert_eq!(config.notify.scratch_path, "");
    }

    #[test]
    fn test_scratch_path_must_be_uri() {
        assert!(matches!(
            parse("[notify]\nscratch_path = tmp\n"),
            Err(ConfigError::InvalidValue { section, .. }) if section == "notify"
        ));
    }

    #[test]
    fn test_logging_section() {
        let config = parse("[logging]\ndirectory = /var/log/ngbridge\nfile = bridge.log\n").unwrap();
        assert_eq!(config.logging.directory, PathBuf::from("/var/log/ngbridge"));
        assert_eq!(config.logging.file, "bridge.log");
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/logs"), home.join("logs"));
        }
    }
}
