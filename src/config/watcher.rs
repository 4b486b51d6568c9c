// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File watching for configuration hot reload.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::ConfigError;

/// A running file watch. Stops when [`stop`](Self::stop) is called or the
/// handle is dropped.
#[must_use = "dropping the handle stops watching"]
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    active: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Watch `targets` and call `on_change` whenever one of them is written,
    /// created, renamed or removed.
    ///
    /// Parent directories are watched instead of the files, so an editor's
    /// write-to-temp-then-rename replacement is still seen.
    pub(crate) fn spawn<F>(targets: &[PathBuf], on_change: F) -> Result<Self, ConfigError>
    where
        F: Fn() + Send + 'static,
    {
        let names: BTreeSet<OsString> = targets
            .iter()
            .filter_map(|t| t.file_name().map(|n| n.to_os_string()))
            .collect();
        let dirs: BTreeSet<PathBuf> = targets.iter().map(|t| watch_dir(t)).collect();

        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if !flag.load(Ordering::Acquire) {
                    return;
                }
                match res {
                    Ok(event) if is_relevant(&event, &names) => on_change(),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "config watch error"),
                }
            },
            NotifyConfig::default(),
        )?;

        for dir in &dirs {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            tracing::debug!(dir = %dir.display(), "watching config directory");
        }

        Ok(Self {
            watcher: Some(watcher),
            active,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop watching. Idempotent.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.watcher.take();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

fn watch_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant(event: &Event, names: &BTreeSet<OsString>) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| names.contains(n)).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn names(list: &[&str]) -> BTreeSet<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_watch_dir_for_relative_file() {
        assert_eq!(watch_dir(Path::new("gantry.yaml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/etc/gantry.yaml")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_relevant_events() {
        let targets = names(&["gantry.yaml"]);
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/x/gantry.yaml"));
        let other_file = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/x/other.yaml"));
        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/tmp/x/gantry.yaml"));

        assert!(is_relevant(&created, &targets));
        assert!(!is_relevant(&other_file, &targets));
        assert!(!is_relevant(&access, &targets));
    }

    fn wait_for(counter: &AtomicUsize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) > 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_stop_is_idempotent_and_silences_callbacks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yaml");
        std::fs::write(&path, "name: a\n").unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut handle = WatchHandle::spawn(&[path.clone()], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(handle.is_active());

        handle.stop();
        handle.stop();
        assert!(!handle.is_active());

        std::fs::write(&path, "name: b\n").unwrap();
        assert!(!wait_for(&hits, Duration::from_millis(300)));
    }
}
