//! Application configuration.
//!
//! Configuration is an immutable snapshot model: a TOML file is parsed into
//! an [`AppConfig`] value, and on every change a fresh snapshot replaces the
//! previous one (see [`watcher::ConfigWatcher`]). Snapshots are never mutated
//! in place, so readers on any thread can hold an `Arc<AppConfig>` without
//! locking.
//!
//! Every field defaults. A missing file, a missing key, or a file that fails
//! to parse all degrade to the same place: a fully-defaulted snapshot, with
//! a warning in the log. The utility must keep running with whatever the
//! user left on disk.

pub mod watcher;

pub use watcher::ConfigWatcher;

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

use crate::theme::ThemePolicy;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level application configuration snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which theme flags the toggle operates on.
    #[serde(deserialize_with = "deserialize_policy")]
    pub theme_policy: ThemePolicy,
    /// Master switch for all desktop notifications.
    pub show_toasts: bool,
    /// Register the utility to start with the session. The field is parsed
    /// and carried; registration itself is out of scope.
    pub auto_startup: bool,
    /// Per-event notification settings.
    pub toasts: ToastConfig,
    /// Tray icon image paths.
    pub icons: IconConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme_policy: ThemePolicy::Both,
            show_toasts: true,
            auto_startup: false,
            toasts: ToastConfig::default(),
            icons: IconConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Per-event notification settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToastConfig {
    /// Show a toast after each successful toggle.
    pub on_theme_change: bool,
    /// Show a toast when a toggle or reload fails.
    pub on_error: bool,
    /// Show a toast once at startup.
    pub on_startup: bool,
    /// How long toasts stay visible, in seconds.
    pub duration_seconds: u32,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            on_theme_change: true,
            on_error: true,
            on_startup: false,
            duration_seconds: 3,
        }
    }
}

/// Tray icon image paths, relative to the config directory unless absolute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    /// Icon shown while the light theme is active.
    pub light: PathBuf,
    /// Icon shown while the dark theme is active.
    pub dark: PathBuf,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            light: PathBuf::from("icon-light.ico"),
            dark: PathBuf::from("icon-dark.ico"),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Keep the console window visible even when launched without
    /// arguments.
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: false,
        }
    }
}

/// Deserialize a theme policy string, mapping unknown values to `Both`.
fn deserialize_policy<'de, D>(deserializer: D) -> Result<ThemePolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    Ok(ThemePolicy::from_config_str(&text))
}

impl AppConfig {
    /// Parse a configuration snapshot from TOML text.
    ///
    /// Any parse failure returns a fully-defaulted snapshot; partial content
    /// is never mixed with earlier state.
    pub fn from_toml(text: &str) -> Self {
        match toml::from_str(text) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    target: "duskswitch::config",
                    "config file failed to parse, using defaults: {err}"
                );
                Self::default()
            }
        }
    }

    /// Load a configuration snapshot from a file.
    ///
    /// A missing or unreadable file yields defaults with a log message; this
    /// never fails.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    target: "duskswitch::config",
                    path = %path.display(),
                    "no config file, using defaults"
                );
                Self::default()
            }
            Err(err) => {
                tracing::warn!(
                    target: "duskswitch::config",
                    path = %path.display(),
                    "config file unreadable, using defaults: {err}"
                );
                Self::default()
            }
        }
    }

    /// Resolve an icon path against the config directory.
    ///
    /// Absolute paths are used as-is; relative paths are joined onto the
    /// config directory.
    pub fn resolve_icon(&self, use_dark: bool, config_dir: &std::path::Path) -> PathBuf {
        let icon = if use_dark {
            &self.icons.dark
        } else {
            &self.icons.light
        };
        if icon.is_absolute() {
            icon.clone()
        } else {
            config_dir.join(icon)
        }
    }
}

/// The per-user configuration directory.
///
/// Uses the platform project directory when one can be resolved, falling
/// back to the executable's own directory (portable installs), then the
/// current directory.
pub fn config_dir() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("", "", "duskswitch") {
        return dirs.config_dir().to_path_buf();
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            return parent.to_path_buf();
        }
    }
    PathBuf::from(".")
}

/// Full path to the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.theme_policy, ThemePolicy::Both);
        assert!(config.show_toasts);
        assert!(!config.auto_startup);
        assert!(config.toasts.on_theme_change);
        assert!(config.toasts.on_error);
        assert!(!config.toasts.on_startup);
        assert_eq!(config.toasts.duration_seconds, 3);
        assert_eq!(config.icons.light, PathBuf::from("icon-light.ico"));
        assert_eq!(config.icons.dark, PathBuf::from("icon-dark.ico"));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.console);
    }

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml(
            r#"
            theme_policy = "apps-only"
            show_toasts = false
            auto_startup = true

            [toasts]
            on_theme_change = false
            on_error = false
            on_startup = true
            duration_seconds = 10

            [icons]
            light = "sun.ico"
            dark = "moon.ico"

            [logging]
            level = "debug"
            "#,
        );
        assert_eq!(config.theme_policy, ThemePolicy::AppsOnly);
        assert!(!config.show_toasts);
        assert!(config.auto_startup);
        assert!(!config.toasts.on_theme_change);
        assert!(config.toasts.on_startup);
        assert_eq!(config.toasts.duration_seconds, 10);
        assert_eq!(config.icons.light, PathBuf::from("sun.ico"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            theme_policy = "system-only"
            "#,
        );
        assert_eq!(config.theme_policy, ThemePolicy::SystemOnly);
        assert!(config.show_toasts);
        assert_eq!(config.toasts.duration_seconds, 3);
    }

    #[test]
    fn test_unknown_policy_string_falls_back_to_both() {
        let config = AppConfig::from_toml(r#"theme_policy = "everything""#);
        assert_eq!(config.theme_policy, ThemePolicy::Both);
    }

    #[test]
    fn test_malformed_toml_yields_defaults() {
        let config = AppConfig::from_toml("theme_policy = [not toml");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_wrong_value_type_yields_defaults() {
        // A type error anywhere discards the whole document.
        let config = AppConfig::from_toml(
            r#"
            show_toasts = "yes"
            "#,
        );
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, r#"theme_policy = "apps-only""#).unwrap();

        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.theme_policy, ThemePolicy::AppsOnly);
    }

    #[test]
    fn test_resolve_icon_relative_and_absolute() {
        let config = AppConfig::from_toml(
            r#"
            [icons]
            light = "sun.ico"
            "#,
        );
        let dir = std::path::Path::new("/etc/duskswitch");
        assert_eq!(
            config.resolve_icon(false, dir),
            PathBuf::from("/etc/duskswitch/sun.ico")
        );

        let absolute = if cfg!(windows) {
            r#"
            [icons]
            dark = 'C:\icons\moon.ico'
            "#
        } else {
            r#"
            [icons]
            dark = "/icons/moon.ico"
            "#
        };
        let config = AppConfig::from_toml(absolute);
        assert_eq!(config.resolve_icon(true, dir), config.icons.dark);
    }
}
