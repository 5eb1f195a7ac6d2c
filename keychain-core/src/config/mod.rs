//! Key chain configuration
//!
//! A small TOML file (by default `~/.ndn/client.conf`) naming the PIB and
//! TPM locators, plus logging settings. Environment variables override the
//! file:
//!
//! * `KEYCHAIN_CONFIG` - path of the file to load
//! * `KEYCHAIN_PIB`, `KEYCHAIN_TPM` - locators
//! * `KEYCHAIN_LOG_LEVEL`, `KEYCHAIN_LOG_JSON` - logging
//!
//! ```toml
//! pib = "pib-sqlite3:/home/alice/.ndn"
//! tpm = "tpm-file:"
//!
//! [logging]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

mod error;

pub use error::ConfigError;

/// File consulted by [`Config::load`] when `KEYCHAIN_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "client.conf";

/// Key chain configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// PIB locator or alias
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pib: Option<String>,

    /// TPM locator or alias
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm: Option<String>,

    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// The file named by `KEYCHAIN_CONFIG`, else `~/.ndn/client.conf` when
    /// present, else defaults; then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("KEYCHAIN_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KEYCHAIN_*` overrides read through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(pib) = lookup("KEYCHAIN_PIB") {
            self.pib = Some(pib);
        }
        if let Some(tpm) = lookup("KEYCHAIN_TPM") {
            self.tpm = Some(tpm);
        }
        if let Some(level) = lookup("KEYCHAIN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("KEYCHAIN_LOG_JSON") {
            self.logging.json_format =
                json.parse().map_err(|_| ConfigError::InvalidOverride {
                    var: "KEYCHAIN_LOG_JSON",
                    value: json.clone(),
                })?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [("pib", &self.pib), ("tpm", &self.tpm)] {
            if let Some(value) = value {
                if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                    return Err(ConfigError::InvalidLocator {
                        key,
                        value: value.clone(),
                    });
                }
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Key lookup as consumed by locator resolution: `pib` or `tpm`
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "pib" => self.pib.as_deref(),
            "tpm" => self.tpm.as_deref(),
            _ => None,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ndn").join(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.get("pib"), None);
        assert_eq!(config.get("tpm"), None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KEYCHAIN_PIB", "pib-memory:"),
            ("KEYCHAIN_TPM", "tpm-memory:"),
            ("KEYCHAIN_LOG_LEVEL", "debug"),
            ("KEYCHAIN_LOG_JSON", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.get("pib"), Some("pib-memory:"));
        assert_eq!(config.get("tpm"), Some("tpm-memory:"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_bad_json_flag() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == "KEYCHAIN_LOG_JSON").then(|| "maybe".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOverride { var: "KEYCHAIN_LOG_JSON", .. })
        ));
    }

    #[test]
    fn test_locator_validation() {
        let mut config = Config::default();
        config.pib = Some("   ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLocator { key: "pib", .. })
        ));

        config.pib = Some("pib-sqlite3:/a b".to_string());
        assert!(config.validate().is_err());

        config.tpm = Some(String::new());
        config.pib = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLocator { key: "tpm", .. })
        ));
        config.tpm = None;

        config.pib = Some("sqlite3".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(level)) if level == "invalid"
        ));

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.conf");

        let mut config = Config::default();
        config.pib = Some("pib-sqlite3:/var/lib/ndn".to_string());
        config.tpm = Some("tpm-file:".to_string());
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.conf");
        std::fs::write(&path, "tpm = \"tpm-memory:\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.get("pib"), None);
        assert_eq!(config.get("tpm"), Some("tpm-memory:"));
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("client.conf");
        std::fs::write(&path, "pib = [").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_names_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.conf");
        match Config::from_file(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
