//! duskswitch: toggle the OS light/dark appearance from the tray.
//!
//! A background utility with no windows of its own. It sits in the
//! notification area; a left-click flips the OS theme flags, a right-click
//! offers a small menu. Configuration lives in a TOML file that hot-reloads
//! while the utility runs.
//!
//! The crate is organized around a few seams:
//!
//! - [`theme::ThemeStore`] implements the toggle algebra over a
//!   [`theme::ThemeFlags`] backend (registry on Windows, in-memory
//!   elsewhere and in tests).
//! - [`tray::TrayController`] owns the native shell: hidden window, icon,
//!   menu, and the dedicated message-loop thread.
//! - [`config::ConfigWatcher`] serves immutable configuration snapshots and
//!   reloads them on file changes.
//! - [`toast::NotificationSink`] is the pop-up confirmation seam.
//! - [`app`] wires them together.

pub mod app;
pub mod config;
pub mod error;
pub mod theme;
pub mod toast;
pub mod tray;

pub use app::run;
pub use config::{AppConfig, ConfigWatcher};
pub use error::{AppError, ConfigError, ShellError, ThemeError};
pub use theme::{ThemeFlag, ThemeFlags, ThemePolicy, ThemeStore};
pub use toast::{NotificationSink, ToastSink};
pub use tray::{TrayController, TrayOptions, TrayState};
