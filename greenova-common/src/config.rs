//! Configuration loading and database path resolution
//!
//! Priority order for the config file:
//! 1. `--config` command-line argument
//! 2. `GREENOVA_CONFIG` environment variable
//! 3. `~/.config/greenova/config.toml`
//! 4. `/etc/greenova/config.toml`
//!
//! A missing config file is not an error; compiled defaults are used.
//!
//! ```toml
//! database_path = "/srv/greenova/greenova.db"
//! log_level = "debug"
//!
//! [vocabulary.frequency_aliases]
//! "six-monthly" = "biannual"
//!
//! [identifiers]
//! prefixes = ["PCEMP", "MS1180", "W6946", "EPL"]
//! ```

use crate::normalize::Vocabulary;
use crate::validate::IdentifierRules;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GREENOVA_CONFIG";

/// Environment variable naming the database file
pub const DATABASE_ENV_VAR: &str = "GREENOVA_DATABASE";

const APP_DIR: &str = "greenova";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "greenova.db";

/// TOML configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub vocabulary: Vocabulary,
    pub identifiers: IdentifierRules,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
            vocabulary: Vocabulary::default(),
            identifiers: IdentifierRules::default(),
        }
    }
}

impl TomlConfig {
    /// Parse TOML text and check the vocabulary tables
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.vocabulary.validate()?;
        self.identifiers.validate()
    }
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No config file was found; compiled defaults are in use
    Defaults,
}

/// Locate the config file, if any
///
/// An explicit path (argument or environment variable) is returned even when it
/// does not exist, so that [`load_config`] can report it.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load configuration
///
/// A located file that does not exist falls back to defaults; a file that
/// exists but cannot be read or parsed is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let Some(path) = locate_config_file(cli_arg) else {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    };

    if !path.exists() {
        return Ok((TomlConfig::default(), ConfigSource::Defaults));
    }

    let content = std::fs::read_to_string(&path)?;
    let config = TomlConfig::from_toml_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok((config, ConfigSource::File(path)))
}

/// Database path resolution:
/// 1. Command-line argument (highest priority)
/// 2. `GREENOVA_DATABASE` environment variable
/// 3. `database_path` in the TOML config
/// 4. Platform data directory (fallback)
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./greenova_data"))
        .join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_partial_vocabulary_override() {
        let config = TomlConfig::from_toml_str(
            r#"
            log_level = "debug"

            [vocabulary.frequency_aliases]
            "six-monthly" = "biannual"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.vocabulary.normalize_frequency("Six-Monthly"), "biannual");
        // Overriding one table replaces it and leaves the other at its default
        assert_eq!(config.vocabulary.normalize_frequency("yearly"), "yearly");
        assert_eq!(config.vocabulary.map_aspect(Some("dust")), "Air Quality");
    }

    #[test]
    fn test_invalid_alias_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [vocabulary.frequency_aliases]
            "hourly" = "every hour"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_default_prefix_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [identifiers]
            default_prefix = "EPL"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("log_level = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_default_database_path_ends_with_file_name() {
        let path = default_database_path();
        assert!(path.ends_with("greenova/greenova.db"));
    }
}
