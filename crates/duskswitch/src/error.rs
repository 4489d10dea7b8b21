//! Error types for duskswitch.

/// Errors from the theme setting store.
#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    /// The settings key could not be opened for writing.
    #[error("failed to open theme settings key '{key}': {message}")]
    OpenKey { key: String, message: String },

    /// A theme flag could not be read.
    #[error("failed to read theme flag '{name}': {message}")]
    ReadFlag { name: String, message: String },

    /// A theme flag could not be written.
    #[error("failed to write theme flag '{name}': {message}")]
    WriteFlag { name: String, message: String },
}

impl ThemeError {
    /// Create an open-key error.
    pub fn open_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenKey {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a read-flag error.
    pub fn read_flag(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFlag {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a write-flag error.
    pub fn write_flag(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFlag {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors from the configuration watcher.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The watcher has been closed; no further snapshots are available.
    #[error("configuration watcher has been disposed")]
    Disposed,
}

/// Errors from the native shell (tray icon, hidden window, message loop).
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// `initialize` was called more than once.
    #[error("tray controller already initialized")]
    AlreadyInitialized,

    /// The window class could not be registered.
    #[error("failed to register tray window class: {0}")]
    ClassRegistration(String),

    /// The hidden message window could not be created.
    #[error("failed to create tray message window: {0}")]
    WindowCreation(String),

    /// The notification-area icon could not be registered.
    #[error("failed to register tray icon: {0}")]
    IconRegistration(String),

    /// The loop thread terminated before reporting readiness.
    #[error("tray loop thread terminated during startup")]
    LoopThreadFailed,

    /// The shell subsystem is not available on this platform.
    #[error("system tray is not supported on this platform")]
    Unsupported,
}

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Theme(#[from] ThemeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_error_display() {
        let err = ThemeError::write_flag("SystemUsesLightTheme", "access denied");
        assert_eq!(
            err.to_string(),
            "failed to write theme flag 'SystemUsesLightTheme': access denied"
        );
    }

    #[test]
    fn test_app_error_from_shell() {
        let err: AppError = ShellError::Unsupported.into();
        assert!(matches!(err, AppError::Shell(ShellError::Unsupported)));
    }
}
