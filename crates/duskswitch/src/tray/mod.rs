//! Notification-area icon controller.
//!
//! [`TrayController`] owns the native shell integration: a hidden
//! message-only window, the tray icon, its context menu, and the thread
//! running the message loop. Everything thread-affine lives on that one
//! dedicated loop thread; the controller's public surface is callable from
//! any thread and communicates with the loop via posted messages.
//!
//! Lifecycle is a one-way state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Running -> ExitRequested -> Disposed
//! ```
//!
//! `initialize` blocks until the loop thread has either registered the icon
//! (Running) or failed (the error is returned and the controller is
//! Disposed). `request_exit` is a one-shot: however many callers race, the
//! quit message is posted exactly once. `dispose` is idempotent and joins
//! the loop thread, on which all teardown runs.

#[cfg(target_os = "windows")]
mod win32;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU32, AtomicU8, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::ShellError;

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrayState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ExitRequested = 3,
    Disposed = 4,
}

impl TrayState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::ExitRequested,
            _ => Self::Disposed,
        }
    }
}

/// Everything the loop thread needs to build the shell objects.
#[derive(Debug, Clone)]
pub struct TrayOptions {
    /// Tooltip shown on the tray icon.
    pub tooltip: String,
    /// Directory opened by the "Open Config Directory" menu item.
    pub config_dir: PathBuf,
    /// Icon shown while the light theme is active.
    pub icon_light: PathBuf,
    /// Icon shown while the dark theme is active.
    pub icon_dark: PathBuf,
    /// Which icon to register initially.
    pub start_dark: bool,
}

impl TrayOptions {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            tooltip: "duskswitch - Click to toggle theme".to_string(),
            config_dir,
            icon_light: PathBuf::from("icon-light.ico"),
            icon_dark: PathBuf::from("icon-dark.ico"),
            start_dark: true,
        }
    }
}

/// Callbacks fired by the loop thread.
///
/// `on_activate` runs on the worker pool (fire-and-forget);
/// `on_exit_requested` runs synchronously on the loop thread. Both are
/// panic-isolated at the dispatch site.
pub(crate) struct TrayCallbacks {
    pub on_activate: Arc<dyn Fn() + Send + Sync>,
    pub on_exit_requested: Arc<dyn Fn() + Send + Sync>,
}

/// Controller for the tray icon and its message loop.
pub struct TrayController {
    state: AtomicU8,
    exit_posted: AtomicBool,
    options: TrayOptions,
    /// Window handle as an integer; 0 until Running. Handles are plain
    /// pointers on the OS side, so an atomic integer is how they cross
    /// threads.
    hwnd: AtomicIsize,
    /// Native id of the loop thread; 0 until Running.
    loop_thread_id: AtomicU32,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TrayController {
    pub fn new(options: TrayOptions) -> Self {
        Self {
            state: AtomicU8::new(TrayState::Uninitialized as u8),
            exit_posted: AtomicBool::new(false),
            options,
            hwnd: AtomicIsize::new(0),
            loop_thread_id: AtomicU32::new(0),
            loop_thread: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrayState {
        TrayState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Spawn the loop thread and register the tray icon.
    ///
    /// Blocks until the icon is visible or setup failed. Icon registration
    /// failure is fatal; a missing icon *file* is not (a stock icon is
    /// used). Calling this more than once returns
    /// [`ShellError::AlreadyInitialized`].
    pub fn initialize<A, E>(&self, on_activate: A, on_exit_requested: E) -> Result<(), ShellError>
    where
        A: Fn() + Send + Sync + 'static,
        E: Fn() + Send + Sync + 'static,
    {
        if self
            .state
            .compare_exchange(
                TrayState::Uninitialized as u8,
                TrayState::Initializing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(ShellError::AlreadyInitialized);
        }

        let callbacks = TrayCallbacks {
            on_activate: Arc::new(on_activate),
            on_exit_requested: Arc::new(on_exit_requested),
        };
        match self.spawn_loop(callbacks) {
            Ok(()) => {
                self.state
                    .store(TrayState::Running as u8, Ordering::SeqCst);
                tracing::info!(target: "duskswitch::tray", "tray icon registered");
                self.resume_pending_exit();
                Ok(())
            }
            Err(err) => {
                self.state
                    .store(TrayState::Disposed as u8, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    #[cfg(target_os = "windows")]
    fn spawn_loop(&self, callbacks: TrayCallbacks) -> Result<(), ShellError> {
        let handles = win32::spawn_loop(self.options.clone(), callbacks)?;
        self.hwnd.store(handles.hwnd, Ordering::SeqCst);
        self.loop_thread_id
            .store(handles.thread_id, Ordering::SeqCst);
        *self.loop_thread.lock() = Some(handles.join);
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn spawn_loop(&self, _callbacks: TrayCallbacks) -> Result<(), ShellError> {
        Err(ShellError::Unsupported)
    }

    /// Ask the message loop to stop.
    ///
    /// One-shot: returns `true` for exactly one caller, no matter how many
    /// threads race, and `false` for every later call. Safe to call in any
    /// state.
    pub fn request_exit(&self) -> bool {
        if self.exit_posted.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(target: "duskswitch::tray", "exit requested");
        // Only a Running controller moves to ExitRequested; an early or
        // late request just records the flag.
        let _ = self.state.compare_exchange(
            TrayState::Running as u8,
            TrayState::ExitRequested as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.post_quit();
        true
    }

    /// Re-post a quit that raced startup.
    ///
    /// An exit requested before the loop thread id was stored consumed the
    /// one-shot flag without its post reaching any loop. Once the handles
    /// exist, the post must still happen or the loop never ends.
    fn resume_pending_exit(&self) {
        if !self.exit_posted.load(Ordering::SeqCst) {
            return;
        }
        tracing::info!(target: "duskswitch::tray", "exit was requested during startup");
        let _ = self.state.compare_exchange(
            TrayState::Running as u8,
            TrayState::ExitRequested as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.post_quit();
    }

    #[cfg(target_os = "windows")]
    fn post_quit(&self) {
        let thread_id = self.loop_thread_id.load(Ordering::SeqCst);
        if thread_id != 0 {
            win32::post_quit(thread_id);
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn post_quit(&self) {}

    /// Swap the tray icon to the light or dark variant.
    ///
    /// Delivered as a posted message and applied on the loop thread. A
    /// no-op unless the controller is Running.
    pub fn update_icon(&self, use_dark: bool) {
        if self.state() != TrayState::Running {
            return;
        }
        let hwnd = self.hwnd.load(Ordering::SeqCst);
        if hwnd == 0 {
            return;
        }
        self.post_icon_update(hwnd, use_dark);
    }

    #[cfg(target_os = "windows")]
    fn post_icon_update(&self, hwnd: isize, use_dark: bool) {
        win32::post_icon_update(hwnd, use_dark);
    }

    #[cfg(not(target_os = "windows"))]
    fn post_icon_update(&self, _hwnd: isize, _use_dark: bool) {}

    /// Wait for the loop thread to finish.
    ///
    /// Returns immediately if the loop was never started or was already
    /// joined.
    pub fn wait(&self) {
        let handle = self.loop_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(target: "duskswitch::tray", "tray loop thread panicked");
            }
        }
    }

    /// Tear down the icon, window, and loop thread.
    ///
    /// Idempotent. Requests exit if nobody has, then joins the loop thread;
    /// the native teardown itself runs on the loop thread as it leaves the
    /// message loop.
    pub fn dispose(&self) {
        if self.state() == TrayState::Disposed {
            return;
        }
        self.request_exit();
        self.wait();
        self.hwnd.store(0, Ordering::SeqCst);
        self.loop_thread_id.store(0, Ordering::SeqCst);
        self.state
            .store(TrayState::Disposed as u8, Ordering::SeqCst);
        tracing::debug!(target: "duskswitch::tray", "tray controller disposed");
    }
}

impl Drop for TrayController {
    fn drop(&mut self) {
        self.dispose();
    }
}
