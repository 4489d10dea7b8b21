//! Desktop toast notifications.
//!
//! [`NotificationSink`] is the seam the coordinators talk to: three
//! fire-and-forget methods, asynchronous, never returning an error into the
//! caller. [`ToastSink`] is the real implementation over `notify-rust`,
//! dispatching each toast on the worker pool so a slow notification server
//! cannot stall the caller.
//!
//! Per-event enablement (`toasts.on_theme_change` and friends) is the
//! coordinators' concern; the sink only applies the duration from the
//! latest configuration snapshot.

use std::sync::Arc;

use duskswitch_core::WorkerPool;
use notify_rust::{Notification, Timeout};

use crate::config::ConfigWatcher;

const APP_NAME: &str = "duskswitch";

/// Receiver for user-facing pop-up confirmations.
pub trait NotificationSink: Send + Sync {
    /// The theme changed; `label` is "Light" or "Dark".
    fn notify_theme_changed(&self, label: &str);

    /// Something user-visible went wrong.
    fn notify_error(&self, message: &str);

    /// The utility started and is sitting in the tray.
    fn notify_startup(&self);
}

/// [`NotificationSink`] over the platform notification server.
pub struct ToastSink {
    config: Arc<ConfigWatcher>,
}

impl ToastSink {
    pub fn new(config: Arc<ConfigWatcher>) -> Self {
        Self { config }
    }

    fn duration_ms(&self) -> u32 {
        self.config
            .current()
            .map(|c| c.toasts.duration_seconds)
            .unwrap_or(3)
            .saturating_mul(1000)
    }

    fn show(&self, summary: String, body: String) {
        let timeout = Timeout::Milliseconds(self.duration_ms());
        WorkerPool::global().spawn(move || {
            let result = Notification::new()
                .appname(APP_NAME)
                .summary(&summary)
                .body(&body)
                .timeout(timeout)
                .show();
            if let Err(err) = result {
                tracing::warn!(
                    target: "duskswitch::toast",
                    "failed to show notification '{summary}': {err}"
                );
            }
        });
    }
}

impl NotificationSink for ToastSink {
    fn notify_theme_changed(&self, label: &str) {
        self.show(
            "Theme changed".to_string(),
            format!("{label} theme is now active."),
        );
    }

    fn notify_error(&self, message: &str) {
        self.show("Theme toggle failed".to_string(), message.to_string());
    }

    fn notify_startup(&self) {
        self.show(
            "duskswitch is running".to_string(),
            "Click the tray icon to toggle the theme.".to_string(),
        );
    }
}
