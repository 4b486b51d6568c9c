// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configuration layers with proper precedence.

use serde_json::{Map, Value};

use super::types::AppConfig;

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub debug: bool,
    pub database_path: Option<String>,
}

/// Deep-merge `overlay` into `base`.
///
/// Mappings merge key by key; any other value in `overlay` replaces the one
/// in `base`, including sequences. A `null` in the overlay leaves the base
/// value alone.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if value.is_null() {
                    continue;
                }
                let slot = base.entry(key).or_insert_with(|| {
                    if value.is_object() {
                        Value::Object(Map::new())
                    } else {
                        Value::Null
                    }
                });
                merge_values(slot, value);
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// Read a raw environment value as the most specific JSON scalar.
pub fn parse_env_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    Value::String(raw.to_string())
}

/// Build an override tree from environment variables.
///
/// `PREFIX_SECTION_KEY=value` becomes `{section: {key: value}}`, lower-cased.
/// The section ends at the first underscore after the prefix, so
/// `GANTRY_DATABASE_MAX_CONNECTIONS` sets `database.max_connections`.
/// `PREFIX_NAME` with no further underscore sets the top-level `name`.
pub fn env_overrides<I, K, V>(prefix: &str, vars: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = Map::new();
    let lead = format!("{}_", prefix.to_ascii_uppercase());

    for (name, value) in vars {
        let Some(rest) = name.as_ref().strip_prefix(&lead) else {
            continue;
        };
        let rest = rest.to_ascii_lowercase();
        if rest.is_empty() {
            continue;
        }
        let value = parse_env_value(value.as_ref());

        match rest.split_once('_') {
            Some((section, key)) if !section.is_empty() && !key.is_empty() => {
                let entry = root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(section) = entry {
                    section.insert(key.to_string(), value);
                }
            }
            _ => {
                root.insert(rest, value);
            }
        }
    }

    Value::Object(root)
}

/// Overrides from the process environment.
pub fn process_env_overrides(prefix: &str) -> Value {
    env_overrides(prefix, std::env::vars())
}

/// Apply CLI options (highest precedence) to a resolved config.
pub fn apply_cli_options(config: &mut AppConfig, cli: &CliOptions) {
    if let Some(ref level) = cli.log_level {
        config.log.level = level.clone();
    }
    if cli.debug {
        config.log.level = "debug".to_string();
    }
    if let Some(ref format) = cli.log_format {
        config.log.format = format.clone();
    }
    if let Some(ref path) = cli.database_path {
        config.database.path = Some(path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_values_is_deep() {
        let mut base = json!({
            "name": "base",
            "log": {"level": "info", "format": "compact"},
            "tags": ["a", "b"]
        });
        merge_values(
            &mut base,
            json!({
                "log": {"level": "debug"},
                "tags": ["c"],
                "environment": null
            }),
        );

        assert_eq!(base["name"], "base");
        assert_eq!(base["log"]["level"], "debug");
        assert_eq!(base["log"]["format"], "compact");
        assert_eq!(base["tags"], json!(["c"]));
        assert!(base.get("environment").is_none());
    }

    #[test]
    fn test_merge_drops_nulls_under_new_keys() {
        let mut base = json!({"name": "base"});
        merge_values(
            &mut base,
            json!({"database": {"path": null, "max_connections": 2}, "environment": null}),
        );

        assert_eq!(base, json!({"name": "base", "database": {"max_connections": 2}}));
    }

    #[test]
    fn test_merge_scalar_over_object() {
        let mut base = json!({"cache": {"ttl": "5m"}});
        merge_values(&mut base, json!({"cache": false}));
        assert_eq!(base["cache"], json!(false));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env_value("TRUE"), json!(true));
        assert_eq!(parse_env_value("false"), json!(false));
        assert_eq!(parse_env_value("42"), json!(42));
        assert_eq!(parse_env_value("0.5"), json!(0.5));
        assert_eq!(parse_env_value("5s"), json!("5s"));
        assert_eq!(parse_env_value("NaN"), json!("NaN"));
    }

    #[test]
    fn test_env_overrides_sections() {
        let vars = vec![
            ("GANTRY_NAME", "from-env"),
            ("GANTRY_LOG_LEVEL", "debug"),
            ("GANTRY_DATABASE_MAX_CONNECTIONS", "8"),
            ("GANTRY_CACHE_ENABLED", "false"),
            ("OTHER_LOG_LEVEL", "error"),
            ("GANTRY_", "ignored"),
        ];
        let tree = env_overrides("gantry", vars);

        assert_eq!(tree["name"], "from-env");
        assert_eq!(tree["log"]["level"], "debug");
        assert_eq!(tree["database"]["max_connections"], 8);
        assert_eq!(tree["cache"]["enabled"], false);
        assert_eq!(tree.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_env_overrides_apply_to_app_config() {
        let mut tree = serde_json::to_value(AppConfig::default()).unwrap();
        merge_values(
            &mut tree,
            env_overrides("GANTRY", [("GANTRY_CACHE_TTL", "30s")]),
        );
        let config: AppConfig = serde_json::from_value(tree).unwrap();
        assert_eq!(config.cache.ttl, std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_cli_options_win() {
        let mut config = AppConfig::default();
        apply_cli_options(
            &mut config,
            &CliOptions {
                log_level: Some("warn".to_string()),
                debug: true,
                database_path: Some(":memory:".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(config.log.level, "debug");
        assert!(config.database.is_memory());
    }
}
