use duskswitch::config::{self, AppConfig};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured log level.
const LOG_ENV: &str = "DUSKSWITCH_LOG";

fn main() {
    let config = AppConfig::load_or_default(&config::config_file_path());
    hide_console_if_launched_plain(&config);
    init_tracing(&config.logging.level);

    if let Err(err) = duskswitch::run() {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

/// Detach from the console when launched without arguments.
///
/// Double-clicking the binary should leave nothing visible but the tray
/// icon; any command-line argument, or `logging.console = true` in the
/// config file, keeps the console for debugging.
#[cfg(target_os = "windows")]
fn hide_console_if_launched_plain(config: &AppConfig) {
    use windows::Win32::System::Console::GetConsoleWindow;
    use windows::Win32::UI::WindowsAndMessaging::{SW_HIDE, ShowWindow};

    if std::env::args().len() > 1 || config.logging.console {
        return;
    }
    // SAFETY: both calls take no pointers; a null console window is
    // checked before use.
    unsafe {
        let console = GetConsoleWindow();
        if !console.is_invalid() {
            let _ = ShowWindow(console, SW_HIDE);
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn hide_console_if_launched_plain(_config: &AppConfig) {}

/// Install the tracing subscriber.
///
/// The level comes from the config file; `DUSKSWITCH_LOG` overrides it with
/// a full filter expression.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
