// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration discovery and file reading.
//!
//! Handles finding and reading JSON and YAML configuration files.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::ConfigError;

use super::types::AppConfig;

/// Config file names to search for in each directory (in order).
pub const CONFIG_FILES: &[&str] = &[
    "gantry.yaml",
    "gantry.yml",
    "gantry.json",
    "config/gantry.yaml",
];

/// Global config directory name under the platform config directory.
pub const GLOBAL_CONFIG_DIR: &str = "gantry";

/// Global config file name.
pub const GLOBAL_CONFIG_FILE: &str = "config.yaml";

/// Local override file, merged on top of the main config.
pub const LOCAL_CONFIG_FILE: &str = "gantry.local.yaml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "GANTRY";

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    /// Pick the format from a file extension. Anything but `.yaml` and `.yml`
    /// is JSON.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Parse configuration text into a JSON tree.
///
/// An empty document reads as an empty object.
pub fn parse_value(content: &str, format: FileFormat) -> Result<Value, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = match format {
        FileFormat::Yaml => serde_yaml::from_str(content)?,
        FileFormat::Json => serde_json::from_str(content)?,
    };
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Default::default())),
        other => Err(ConfigError::InvalidFormat(format!(
            "top level must be a mapping, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Read a configuration file (JSON or YAML) as a JSON tree.
pub fn read_value(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::IoError(format!("{}: {}", path.display(), e)),
        })?;
    parse_value(&content, FileFormat::from_path(path))
}

/// Load a configuration file into an [`AppConfig`].
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let value = read_value(path)?;
    serde_json::from_value(value).map_err(ConfigError::from)
}

/// Path of the user-wide config file (`~/.config/gantry/config.yaml` on Linux).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Find the first config file in `dir`.
pub fn config_file_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Find the nearest config file.
///
/// Walks up the directory tree from `start` until a directory holds one of
/// [`CONFIG_FILES`] or the filesystem root is reached.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(config_file_in)
}

/// The directory that owns a config file (the parent of `config/` for the
/// nested layout).
pub fn config_root(config_path: &Path) -> Option<&Path> {
    let parent = config_path.parent()?;
    if parent.file_name().and_then(|n| n.to_str()) == Some("config") {
        parent.parent()
    } else {
        Some(parent)
    }
}

/// Write a starter configuration file.
pub fn init_config(dir: &Path, config: Option<AppConfig>) -> Result<PathBuf, ConfigError> {
    let config = config.unwrap_or_default();
    let path = dir.join(CONFIG_FILES[0]);
    if path.exists() {
        return Err(ConfigError::InvalidValue {
            field: path.display().to_string(),
            message: "already exists".to_string(),
        });
    }
    let content = serde_yaml::to_string(&config)?;
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_files_order() {
        assert_eq!(CONFIG_FILES.len(), 4);
        assert_eq!(CONFIG_FILES[0], "gantry.yaml");
    }

    #[test]
    fn test_global_config_path() {
        if let Some(path) = global_config_path() {
            assert!(path.ends_with("gantry/config.yaml"));
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("a.yaml")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("a.YML")), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("a.json")), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a")), FileFormat::Json);
    }

    #[test]
    fn test_parse_value_rejects_scalars() {
        assert!(parse_value("", FileFormat::Yaml).unwrap().is_object());
        assert!(parse_value("~", FileFormat::Yaml).unwrap().is_object());
        assert!(matches!(
            parse_value("42", FileFormat::Json),
            Err(ConfigError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_value("{oops", FileFormat::Json),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            read_value(&temp.path().join("gantry.yaml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("gantry.json"), r#"{"name": "walk"}"#).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("gantry.json"));
        assert_eq!(load_config_file(&found).unwrap().name, "walk");
    }

    #[test]
    fn test_nested_config_dir_layout() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("config")).unwrap();
        let path = temp.path().join("config").join("gantry.yaml");
        std::fs::write(&path, "name: nested\n").unwrap();

        assert_eq!(config_file_in(temp.path()), Some(path.clone()));
        assert_eq!(config_root(&path), Some(temp.path()));
    }

    #[test]
    fn test_yaml_preferred_over_json() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("gantry.json"), r#"{"name": "json"}"#).unwrap();
        std::fs::write(temp.path().join("gantry.yaml"), "name: yaml\n").unwrap();
        let found = config_file_in(temp.path()).unwrap();
        assert_eq!(load_config_file(&found).unwrap().name, "yaml");
    }

    #[test]
    fn test_init_config_writes_once() {
        let temp = TempDir::new().unwrap();
        let path = init_config(temp.path(), None).unwrap();
        assert_eq!(load_config_file(&path).unwrap(), AppConfig::default());
        assert!(init_config(temp.path(), None).is_err());
    }
}
