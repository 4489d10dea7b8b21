//! Application wiring: the toggle path, shutdown routing, and the run loop.

use std::sync::Arc;

use crate::config::{self, ConfigWatcher};
use crate::error::AppError;
use crate::theme::{ThemeFlags, ThemeStore};
use crate::toast::NotificationSink;
use crate::tray::{TrayController, TrayOptions};

#[cfg(target_os = "windows")]
type PlatformFlags = crate::theme::registry::RegistryFlags;
#[cfg(not(target_os = "windows"))]
type PlatformFlags = crate::theme::memory::MemoryFlags;

/// Everything that happens when the tray icon is clicked.
///
/// `on_activate` is entered from the worker pool; every failure stops here.
/// Errors are logged, optionally surfaced as an error toast, and never
/// propagate back toward the message loop.
pub struct ToggleCoordinator<F: ThemeFlags> {
    theme: Arc<ThemeStore<F>>,
    config: Arc<ConfigWatcher>,
    tray: Arc<TrayController>,
    sink: Arc<dyn NotificationSink>,
}

impl<F: ThemeFlags> ToggleCoordinator<F> {
    pub fn new(
        theme: Arc<ThemeStore<F>>,
        config: Arc<ConfigWatcher>,
        tray: Arc<TrayController>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            theme,
            config,
            tray,
            sink,
        }
    }

    /// Toggle the theme, refresh the tray icon, and maybe toast.
    pub fn on_activate(&self) {
        let Ok(snapshot) = self.config.current() else {
            // Disposed mid-shutdown; the click loses the race, nothing to do.
            return;
        };
        let policy = snapshot.theme_policy;

        match self.theme.toggle(policy) {
            Ok(_) => {
                // Re-read rather than trust the toggle result: another
                // writer may have raced us, and the icon should show what
                // the OS actually has.
                let is_light = self.theme.is_light_enabled(policy);
                self.tray.update_icon(!is_light);

                // Toast enablement follows the latest snapshot, which a
                // hot reload may have changed since the click.
                if let Ok(latest) = self.config.current() {
                    if latest.show_toasts && latest.toasts.on_theme_change {
                        self.sink
                            .notify_theme_changed(if is_light { "Light" } else { "Dark" });
                    }
                }
            }
            Err(err) => {
                tracing::error!(target: "duskswitch::theme", "theme toggle failed: {err}");
                if let Ok(latest) = self.config.current() {
                    if latest.show_toasts && latest.toasts.on_error {
                        self.sink.notify_error(&err.to_string());
                    }
                }
            }
        }
    }
}

/// Route console control events (Ctrl+C, close, logoff, shutdown) into the
/// same one-shot exit request the menu uses.
#[cfg(target_os = "windows")]
fn install_exit_handler(tray: Arc<TrayController>) {
    use std::sync::OnceLock;

    use windows::Win32::Foundation::{BOOL, TRUE};
    use windows::Win32::System::Console::SetConsoleCtrlHandler;

    static EXIT_TARGET: OnceLock<Arc<TrayController>> = OnceLock::new();

    unsafe extern "system" fn handler(_ctrl_type: u32) -> BOOL {
        if let Some(tray) = EXIT_TARGET.get() {
            tray.request_exit();
        }
        // Handled: suppress the default process kill so teardown can run.
        TRUE
    }

    if EXIT_TARGET.set(tray).is_err() {
        return;
    }
    // SAFETY: the handler is a plain function valid for the process
    // lifetime and touches only the OnceLock.
    if let Err(err) = unsafe { SetConsoleCtrlHandler(Some(handler), true) } {
        tracing::warn!(target: "duskswitch::tray", "failed to install console handler: {err}");
    }
}

#[cfg(not(target_os = "windows"))]
fn install_exit_handler(_tray: Arc<TrayController>) {}

/// Wire everything up and block until the user exits.
pub fn run() -> Result<(), AppError> {
    let config_dir = config::config_dir();
    let watcher = Arc::new(ConfigWatcher::new(config::config_file_path()));
    let snapshot = watcher.current()?;
    tracing::info!(
        target: "duskswitch::config",
        dir = %config_dir.display(),
        policy = snapshot.theme_policy.as_str(),
        "configuration loaded"
    );

    let theme = Arc::new(ThemeStore::new(PlatformFlags::default()));
    let is_light = theme.is_light_enabled(snapshot.theme_policy);

    let tray = Arc::new(TrayController::new(TrayOptions {
        tooltip: "duskswitch - Click to toggle theme".to_string(),
        config_dir: config_dir.clone(),
        icon_light: snapshot.resolve_icon(false, &config_dir),
        icon_dark: snapshot.resolve_icon(true, &config_dir),
        start_dark: !is_light,
    }));

    let sink: Arc<dyn NotificationSink> =
        Arc::new(crate::toast::ToastSink::new(watcher.clone()));
    let coordinator = Arc::new(ToggleCoordinator::new(
        theme,
        watcher.clone(),
        tray.clone(),
        sink.clone(),
    ));

    let activate = coordinator.clone();
    let exit_tray = tray.clone();
    let init = tray.initialize(
        move || activate.on_activate(),
        move || {
            exit_tray.request_exit();
        },
    );
    if let Err(err) = init {
        watcher.close();
        return Err(err.into());
    }

    // Installed once the loop thread is up, so a control event always has a
    // live quit target.
    install_exit_handler(tray.clone());

    if snapshot.show_toasts && snapshot.toasts.on_startup {
        sink.notify_startup();
    }

    // Blocks until the message loop ends, then releases everything.
    tray.wait();
    tray.dispose();
    watcher.close();
    tracing::info!(target: "duskswitch::tray", "shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::memory::MemoryFlags;
    use crate::theme::{ThemeFlag, ThemePolicy};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        theme_changes: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
        startups: AtomicUsize,
    }

    impl NotificationSink for RecordingSink {
        fn notify_theme_changed(&self, label: &str) {
            self.theme_changes.lock().push(label.to_string());
        }

        fn notify_error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }

        fn notify_startup(&self) {
            self.startups.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        coordinator: ToggleCoordinator<MemoryFlags>,
        sink: Arc<RecordingSink>,
        theme: Arc<ThemeStore<MemoryFlags>>,
    }

    fn fixture(config_toml: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, config_toml).unwrap();

        let watcher = Arc::new(ConfigWatcher::new(path));
        let theme = Arc::new(ThemeStore::new(MemoryFlags::new()));
        theme.flags().set(ThemeFlag::System, 0);
        theme.flags().set(ThemeFlag::Apps, 0);
        let tray = Arc::new(TrayController::new(TrayOptions::new(
            Path::new(".").to_path_buf(),
        )));
        let sink = Arc::new(RecordingSink::default());

        let coordinator =
            ToggleCoordinator::new(theme.clone(), watcher, tray, sink.clone());
        Fixture {
            _dir: dir,
            coordinator,
            sink,
            theme,
        }
    }

    #[test]
    fn test_activate_toggles_and_toasts() {
        let fx = fixture("");
        fx.coordinator.on_activate();

        assert!(fx.theme.is_light_enabled(ThemePolicy::Both));
        assert_eq!(*fx.sink.theme_changes.lock(), vec!["Light".to_string()]);
        assert!(fx.sink.errors.lock().is_empty());
        assert_eq!(fx.sink.startups.load(Ordering::SeqCst), 0);

        fx.coordinator.on_activate();
        assert_eq!(
            *fx.sink.theme_changes.lock(),
            vec!["Light".to_string(), "Dark".to_string()]
        );
    }

    #[test]
    fn test_activate_with_toast_disabled_stays_silent() {
        let fx = fixture("[toasts]\non_theme_change = false");
        fx.coordinator.on_activate();

        // The toggle still happened, only the toast was suppressed.
        assert!(fx.theme.is_light_enabled(ThemePolicy::Both));
        assert!(fx.sink.theme_changes.lock().is_empty());
    }

    #[test]
    fn test_activate_with_master_switch_off_stays_silent() {
        let fx = fixture("show_toasts = false");
        fx.coordinator.on_activate();

        assert!(fx.theme.is_light_enabled(ThemePolicy::Both));
        assert!(fx.sink.theme_changes.lock().is_empty());
        assert!(fx.sink.errors.lock().is_empty());
    }

    #[test]
    fn test_activate_failure_surfaces_error_toast() {
        let fx = fixture("");
        fx.theme.flags().fail_writes(true);

        fx.coordinator.on_activate();

        assert!(fx.sink.theme_changes.lock().is_empty());
        assert_eq!(fx.sink.errors.lock().len(), 1);
    }

    #[test]
    fn test_activate_failure_with_error_toasts_disabled() {
        let fx = fixture("[toasts]\non_error = false");
        fx.theme.flags().fail_writes(true);

        fx.coordinator.on_activate();

        assert!(fx.sink.errors.lock().is_empty());
    }

    #[test]
    fn test_activate_respects_configured_policy() {
        let fx = fixture(r#"theme_policy = "system-only""#);
        fx.coordinator.on_activate();

        assert_eq!(fx.theme.flags().get(ThemeFlag::System), Some(1));
        assert_eq!(fx.theme.flags().get(ThemeFlag::Apps), Some(0));
    }
}
