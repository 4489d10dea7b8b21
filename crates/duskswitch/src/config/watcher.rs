//! Hot-reloading configuration watcher.
//!
//! [`ConfigWatcher`] owns the current [`AppConfig`] snapshot and keeps it in
//! sync with the file on disk. A debounced filesystem watcher delivers
//! change batches to a dedicated thread, which re-parses the file and swaps
//! the snapshot; listeners are notified through a [`Signal`] after the swap,
//! outside any lock.
//!
//! The first snapshot is loaded lazily on the first call to
//! [`current`](ConfigWatcher::current). After that, reads are a lock-free
//! clone of an `Arc` and never wait for a reload in progress.
//!
//! Watch setup is best-effort: if the config directory cannot be watched the
//! watcher still works, it just never hot-reloads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use duskswitch_core::{ConnectionId, Signal};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use parking_lot::{Mutex, RwLock};

use super::AppConfig;
use crate::error::ConfigError;

/// How long to coalesce bursts of file events before reloading.
const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watches the configuration file and serves immutable snapshots.
pub struct ConfigWatcher {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

struct Inner {
    path: PathBuf,
    snapshot: RwLock<Option<Arc<AppConfig>>>,
    /// Serializes load-and-swap; never held while emitting or by readers
    /// that already have a snapshot.
    reload_lock: Mutex<()>,
    changed: Signal<Arc<AppConfig>>,
    disposed: AtomicBool,
}

struct Worker {
    /// Owns the OS watch; dropping it disconnects the event channel and
    /// lets the thread exit.
    _debouncer: Debouncer<RecommendedWatcher>,
    handle: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Create a watcher for the given config file.
    ///
    /// Construction never fails. If the file's directory cannot be watched,
    /// a warning is logged and the watcher serves snapshots without hot
    /// reload.
    pub fn new(path: PathBuf) -> Self {
        let inner = Arc::new(Inner {
            path,
            snapshot: RwLock::new(None),
            reload_lock: Mutex::new(()),
            changed: Signal::new(),
            disposed: AtomicBool::new(false),
        });
        let worker = start_watching(&inner);
        Self {
            inner,
            worker: Mutex::new(worker),
        }
    }

    /// The path of the watched config file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The current configuration snapshot.
    ///
    /// Loads the file on first use; after that this is a cheap `Arc` clone.
    pub fn current(&self) -> Result<Arc<AppConfig>, ConfigError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ConfigError::Disposed);
        }
        if let Some(config) = self.inner.snapshot.read().clone() {
            return Ok(config);
        }

        // First load, double-checked under the reload lock so concurrent
        // first readers parse the file once.
        let _guard = self.inner.reload_lock.lock();
        if let Some(config) = self.inner.snapshot.read().clone() {
            return Ok(config);
        }
        let config = Arc::new(AppConfig::load_or_default(&self.inner.path));
        *self.inner.snapshot.write() = Some(config.clone());
        Ok(config)
    }

    /// Re-parse the file now and notify listeners.
    ///
    /// This is what the watch thread calls on a file event; it is public so
    /// callers can force a refresh.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ConfigError::Disposed);
        }
        Ok(self.inner.reload())
    }

    /// Register a listener for configuration changes.
    ///
    /// The listener is invoked with each new snapshot, on the watch thread.
    pub fn subscribe<F>(&self, listener: F) -> Result<ConnectionId, ConfigError>
    where
        F: Fn(&Arc<AppConfig>) + Send + Sync + 'static,
    {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ConfigError::Disposed);
        }
        Ok(self.inner.changed.connect(listener))
    }

    /// Remove a previously registered listener.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        self.inner.changed.disconnect(id)
    }

    /// Stop watching and release the watch thread.
    ///
    /// Idempotent. After this, `current`, `reload`, and `subscribe` return
    /// [`ConfigError::Disposed`].
    pub fn close(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            // Dropping the debouncer disconnects the channel; the thread
            // observes the disconnect and exits.
            drop(worker._debouncer);
            if worker.handle.join().is_err() {
                tracing::warn!(
                    target: "duskswitch::config",
                    "config watch thread panicked"
                );
            }
        }
        self.inner.changed.disconnect_all();
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn reload(&self) -> Arc<AppConfig> {
        let config = {
            let _guard = self.reload_lock.lock();
            let config = Arc::new(AppConfig::load_or_default(&self.path));
            *self.snapshot.write() = Some(config.clone());
            config
        };
        tracing::info!(
            target: "duskswitch::config",
            path = %self.path.display(),
            "configuration reloaded"
        );
        self.changed.emit(config.clone());
        config
    }
}

/// Set up the filesystem watch and its delivery thread.
///
/// Returns `None` (after logging) on any setup failure.
fn start_watching(inner: &Arc<Inner>) -> Option<Worker> {
    let dir = inner
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = match new_debouncer(DEBOUNCE, tx) {
        Ok(debouncer) => debouncer,
        Err(err) => {
            tracing::warn!(
                target: "duskswitch::config",
                "config watcher unavailable, hot reload disabled: {err}"
            );
            return None;
        }
    };

    // Watch the directory, not the file: editors replace files on save and
    // a direct file watch would be lost with the old inode.
    if let Err(err) = debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
        tracing::warn!(
            target: "duskswitch::config",
            dir = %dir.display(),
            "cannot watch config directory, hot reload disabled: {err}"
        );
        return None;
    }

    let weak: Weak<Inner> = Arc::downgrade(inner);
    let file_name = inner.path.file_name().map(|n| n.to_os_string());
    let spawned = std::thread::Builder::new()
        .name("duskswitch-config".to_string())
        .spawn(move || {
            while let Ok(batch) = rx.recv() {
                let relevant = match batch {
                    Ok(events) => events.iter().any(|event| {
                        file_name
                            .as_deref()
                            .is_none_or(|name| event.path.file_name() == Some(name))
                    }),
                    Err(err) => {
                        tracing::warn!(
                            target: "duskswitch::config",
                            "config watch error: {err}"
                        );
                        false
                    }
                };
                if !relevant {
                    continue;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.disposed.load(Ordering::SeqCst) {
                    break;
                }
                inner.reload();
            }
        });

    match spawned {
        Ok(handle) => Some(Worker {
            _debouncer: debouncer,
            handle,
        }),
        Err(err) => {
            tracing::warn!(
                target: "duskswitch::config",
                "cannot spawn config watch thread, hot reload disabled: {err}"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemePolicy;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn write_config(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_current_lazy_loads_defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ConfigWatcher::new(dir.path().join("config.toml"));

        let config = watcher.current().unwrap();
        assert_eq!(*config, AppConfig::default());
        // Second read serves the same snapshot.
        assert!(Arc::ptr_eq(&config, &watcher.current().unwrap()));
    }

    #[test]
    fn test_current_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"theme_policy = "apps-only""#);
        let watcher = ConfigWatcher::new(path);

        assert_eq!(
            watcher.current().unwrap().theme_policy,
            ThemePolicy::AppsOnly
        );
    }

    #[test]
    fn test_reload_swaps_snapshot_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"show_toasts = true"#);
        let watcher = ConfigWatcher::new(path.clone());
        assert!(watcher.current().unwrap().show_toasts);

        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = notified.clone();
        watcher
            .subscribe(move |config| {
                assert!(!config.show_toasts);
                notified_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        std::fs::write(&path, "show_toasts = false").unwrap();
        watcher.reload().unwrap();

        assert!(!watcher.current().unwrap().show_toasts);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_reload_yields_full_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"theme_policy = "apps-only""#);
        let watcher = ConfigWatcher::new(path.clone());
        assert_eq!(
            watcher.current().unwrap().theme_policy,
            ThemePolicy::AppsOnly
        );

        // The broken file must not leave the previous snapshot in place.
        std::fs::write(&path, "theme_policy = [broken").unwrap();
        let config = watcher.reload().unwrap();
        assert_eq!(*config, AppConfig::default());
        assert_eq!(*watcher.current().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_file_change_triggers_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "show_toasts = true");
        let watcher = ConfigWatcher::new(path.clone());
        watcher.current().unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = notified.clone();
        watcher
            .subscribe(move |_| {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        std::fs::write(&path, "show_toasts = false").unwrap();

        // Debounce plus filesystem latency; generous deadline.
        let deadline = Instant::now() + Duration::from_secs(5);
        while notified.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            notified.load(Ordering::SeqCst) >= 1,
            "file change did not trigger a reload"
        );
        assert!(!watcher.current().unwrap().show_toasts);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");
        let watcher = ConfigWatcher::new(path);

        let notified = Arc::new(AtomicUsize::new(0));
        let notified_clone = notified.clone();
        let id = watcher
            .subscribe(move |_| {
                notified_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        watcher.reload().unwrap();
        assert!(watcher.unsubscribe(id));
        watcher.reload().unwrap();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_poisons_reads() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = ConfigWatcher::new(dir.path().join("config.toml"));
        watcher.current().unwrap();

        watcher.close();
        watcher.close();

        assert!(matches!(watcher.current(), Err(ConfigError::Disposed)));
        assert!(matches!(watcher.reload(), Err(ConfigError::Disposed)));
        assert!(matches!(
            watcher.subscribe(|_| {}),
            Err(ConfigError::Disposed)
        ));
    }
}
