// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key/value access to layered configuration.
//!
//! Keys are dotted paths into the merged tree (`database.busy_timeout`).
//! The empty key addresses the whole tree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::loader::read_value;
use super::merger::{env_overrides, merge_values};
use super::watcher::WatchHandle;
use crate::error::ConfigError;

/// Read access to configuration values.
pub trait Config: Send + Sync {
    /// Value at a dotted key. `null` counts as unset.
    fn get(&self, key: &str) -> Option<Value>;

    /// Every leaf key, sorted.
    fn all_keys(&self) -> Vec<String>;

    /// Strings as-is; numbers and booleans in their text form.
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// `humantime` text ("250ms", "1m 30s") or a number of seconds.
    fn get_duration(&self, key: &str) -> Option<Duration> {
        match self.get(key)? {
            Value::String(s) => humantime::parse_duration(s.trim()).ok(),
            Value::Number(n) => {
                if let Some(secs) = n.as_u64() {
                    Some(Duration::from_secs(secs))
                } else {
                    n.as_f64()
                        .filter(|s| *s >= 0.0 && s.is_finite())
                        .map(Duration::from_secs_f64)
                }
            }
            _ => None,
        }
    }

    /// A sequence of scalars, or a comma-separated string.
    fn get_string_slice(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
            Value::String(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The mapping at `key` as its own config. `None` unless it is a mapping.
    fn sub_tree(&self, key: &str) -> Option<ValueConfig> {
        match self.get(key)? {
            tree @ Value::Object(_) => Some(ValueConfig::new(tree)),
            _ => None,
        }
    }
}

/// Callback run after a watched config changes.
pub type WatchCallback = Box<dyn Fn(&dyn Config) + Send + Sync>;

/// Change notification for configuration sources.
pub trait ConfigWatcher {
    fn watch(&self, callback: WatchCallback) -> Result<WatchHandle, ConfigError>;
}

/// Deserialize the value at `key` (the whole tree for `""`).
pub fn unmarshal<T, C>(config: &C, key: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    C: Config + ?Sized,
{
    let value = config
        .get(key)
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
    let field = if key.is_empty() { "<root>" } else { key };
    serde_json::from_value(value).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

pub(crate) fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    let key = key.trim();
    let found = if key.is_empty() {
        tree
    } else {
        key.split('.').try_fold(tree, |node, part| node.get(part))?
    };
    (!found.is_null()).then_some(found)
}

pub(crate) fn leaf_keys(tree: &Value) -> Vec<String> {
    fn walk(prefix: &str, node: &Value, out: &mut Vec<String>) {
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            Value::Null => {}
            _ if !prefix.is_empty() => out.push(prefix.to_string()),
            _ => {}
        }
    }

    let mut keys = Vec::new();
    walk("", tree, &mut keys);
    keys.sort();
    keys
}

/// An immutable in-memory tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueConfig {
    tree: Value,
}

impl ValueConfig {
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    pub fn into_value(self) -> Value {
        self.tree
    }
}

impl Config for ValueConfig {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.tree, key).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        leaf_keys(&self.tree)
    }
}

#[derive(Debug, Clone)]
enum EnvSource {
    Process(String),
    Fixed(String, Vec<(String, String)>),
}

impl EnvSource {
    fn overrides(&self) -> Value {
        match self {
            Self::Process(prefix) => env_overrides(prefix, std::env::vars()),
            Self::Fixed(prefix, vars) => env_overrides(prefix, vars.iter().cloned()),
        }
    }
}

/// Builds a [`FileConfig`].
#[derive(Debug, Clone)]
pub struct FileConfigBuilder {
    path: PathBuf,
    defaults: Value,
    overlays: Vec<PathBuf>,
    env: Option<EnvSource>,
}

impl FileConfigBuilder {
    /// Lowest layer, under the file.
    pub fn defaults(mut self, defaults: Value) -> Self {
        self.defaults = defaults;
        self
    }

    /// Optional file merged over the main one. Missing is fine.
    pub fn overlay(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlays.push(path.into());
        self
    }

    /// Apply `PREFIX_SECTION_KEY` variables from the process environment.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = Some(EnvSource::Process(prefix.into()));
        self
    }

    /// Apply a fixed set of variables instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.env = Some(EnvSource::Fixed(prefix.into(), vars));
        self
    }

    /// Read every layer. Fails if the main file is missing or malformed.
    pub fn load(self) -> Result<FileConfig, ConfigError> {
        let tree = resolve(&self.path, &self.defaults, &self.overlays, self.env.as_ref())?;
        tracing::debug!(path = %self.path.display(), "config loaded");
        Ok(FileConfig {
            inner: Arc::new(FileConfigInner {
                path: self.path,
                defaults: self.defaults,
                overlays: self.overlays,
                env: self.env,
                tree: RwLock::new(tree),
            }),
        })
    }
}

fn resolve(
    path: &Path,
    defaults: &Value,
    overlays: &[PathBuf],
    env: Option<&EnvSource>,
) -> Result<Value, ConfigError> {
    let mut tree = match defaults {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    merge_values(&mut tree, read_value(path)?);
    for overlay in overlays {
        match read_value(overlay) {
            Ok(value) => merge_values(&mut tree, value),
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    if let Some(env) = env {
        merge_values(&mut tree, env.overrides());
    }
    Ok(tree)
}

struct FileConfigInner {
    path: PathBuf,
    defaults: Value,
    overlays: Vec<PathBuf>,
    env: Option<EnvSource>,
    tree: RwLock<Value>,
}

/// Configuration backed by a JSON or YAML file.
///
/// Layers, lowest first: defaults, the file, overlay files, environment
/// overrides. Clones share the same values, so a reload is seen by all.
#[derive(Clone)]
pub struct FileConfig {
    inner: Arc<FileConfigInner>,
}

impl FileConfig {
    pub fn builder(path: impl Into<PathBuf>) -> FileConfigBuilder {
        FileConfigBuilder {
            path: path.into(),
            defaults: Value::Object(Map::new()),
            overlays: Vec::new(),
            env: None,
        }
    }

    /// Load a single file with no other layers.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::builder(path).load()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Copy of the current merged tree.
    pub fn snapshot(&self) -> ValueConfig {
        ValueConfig::new(self.read_tree().clone())
    }

    /// Re-read every layer.
    ///
    /// Returns whether anything changed. On error the current values are
    /// kept.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let inner = &self.inner;
        let tree = resolve(&inner.path, &inner.defaults, &inner.overlays, inner.env.as_ref())?;
        let mut current = inner.tree.write().unwrap_or_else(|e| e.into_inner());
        if *current == tree {
            return Ok(false);
        }
        *current = tree;
        Ok(true)
    }

    fn read_tree(&self) -> std::sync::RwLockReadGuard<'_, Value> {
        self.inner.tree.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Config for FileConfig {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.read_tree(), key).cloned()
    }

    fn all_keys(&self) -> Vec<String> {
        leaf_keys(&self.read_tree())
    }
}

impl ConfigWatcher for FileConfig {
    /// Reload on every change to the file or an overlay and call `callback`
    /// when the values actually changed. A failed reload is logged and the
    /// previous values stay in effect.
    fn watch(&self, callback: WatchCallback) -> Result<WatchHandle, ConfigError> {
        let mut targets = vec![self.inner.path.clone()];
        targets.extend(self.inner.overlays.iter().cloned());

        let config = self.clone();
        WatchHandle::spawn(&targets, move || match config.reload() {
            Ok(true) => {
                tracing::info!(path = %config.path().display(), "config reloaded");
                callback(&config as &dyn Config);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    path = %config.path().display(),
                    error = %e,
                    "config reload failed, keeping previous values"
                );
            }
        })
    }
}

impl std::fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfig")
            .field("path", &self.inner.path)
            .field("overlays", &self.inner.overlays)
            .finish_non_exhaustive()
    }
}

/// Configuration with no values.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConfig;

impl Config for NoopConfig {
    fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    fn all_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl ConfigWatcher for NoopConfig {
    fn watch(&self, _callback: WatchCallback) -> Result<WatchHandle, ConfigError> {
        Err(ConfigError::NoAdapter)
    }
}
