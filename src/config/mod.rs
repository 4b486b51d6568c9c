// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for gantry.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.config/gantry/config.yaml (platform config directory)
//! - Config file: gantry.yaml, gantry.yml, gantry.json or config/gantry.yaml,
//!   found by walking up from the working directory
//! - Local config: gantry.local.yaml next to it (for personal overrides)
//! - Environment: `GANTRY_SECTION_KEY` variables
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence
//! (CLI > env > local > file > global > defaults).
//! [`FileConfig`] keeps the merged tree available as dotted keys and can
//! watch the files for changes.

mod loader;
mod merger;
mod source;
mod types;
mod watcher;

pub use loader::{
    config_file_in, config_root, find_config_file, global_config_path, init_config,
    load_config_file, parse_value, read_value, FileFormat, CONFIG_FILES, ENV_PREFIX,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{
    apply_cli_options, env_overrides, merge_values, parse_env_value, process_env_overrides,
    CliOptions,
};

pub use source::{
    unmarshal, Config, ConfigWatcher, FileConfig, FileConfigBuilder, NoopConfig, ValueConfig,
    WatchCallback,
};

pub use types::{
    AppConfig, CacheConfig, DatabaseConfig, InterceptorsConfig, LogConfig, MetricsConfig,
    TracingConfig,
};

pub use watcher::WatchHandle;

use std::path::Path;

use serde_json::Value;

use crate::error::ConfigError;

/// Resolved application configuration and the file source it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub app: AppConfig,

    /// `None` when no config file was found and only defaults, environment
    /// and CLI options apply.
    pub source: Option<FileConfig>,
}

/// Built-in defaults with the global config file, if any, merged on top.
pub fn base_tree() -> Result<Value, ConfigError> {
    let mut tree = serde_json::to_value(AppConfig::default())?;
    if let Some(global) = global_config_path().filter(|p| p.is_file()) {
        merge_values(&mut tree, read_value(&global)?);
    }
    Ok(tree)
}

/// Build the layered source for a config file: defaults and global config,
/// the file, the local override beside it, then `GANTRY_*` variables.
pub fn file_source(path: &Path) -> Result<FileConfig, ConfigError> {
    let defaults = base_tree()?;
    let mut builder = FileConfig::builder(path).defaults(defaults);
    if let Some(root) = config_root(path) {
        builder = builder.overlay(root.join(LOCAL_CONFIG_FILE));
    }
    builder.env_prefix(ENV_PREFIX).load()
}

/// Resolve an [`AppConfig`] from a source, applying CLI options last.
pub fn resolve_app_config(
    source: &dyn Config,
    cli: &CliOptions,
) -> Result<AppConfig, ConfigError> {
    let mut app: AppConfig = unmarshal(source, "")?;
    apply_cli_options(&mut app, cli);
    app.validate()?;
    Ok(app)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path, cli: CliOptions) -> Result<LoadedConfig, ConfigError> {
    let source = file_source(path)?;
    let app = resolve_app_config(&source, &cli)?;
    Ok(LoadedConfig {
        app,
        source: Some(source),
    })
}

/// Load and merge all configuration sources, searching from `start`.
///
/// This is the main entry point for configuration loading.
pub fn load_config(start: &Path, cli: CliOptions) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = find_config_file(start) {
        return load_from_path(&path, cli);
    }

    let mut tree = base_tree()?;
    merge_values(&mut tree, process_env_overrides(ENV_PREFIX));
    let app = resolve_app_config(&ValueConfig::new(tree), &cli)?;
    Ok(LoadedConfig { app, source: None })
}
