//! Win32 plumbing for the tray controller.
//!
//! Everything in this module runs on, or posts to, the dedicated loop
//! thread. The window procedure finds its state through a `Box` stashed in
//! the window's user-data slot; the box is created after `CreateWindowExW`
//! and reclaimed during teardown, so the procedure treats a null pointer as
//! "not ready yet" and falls through to `DefWindowProcW`.

use std::ffi::c_void;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use duskswitch_core::{ThreadAffinity, WorkerPool};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    Shell_NotifyIconW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyIcon, DestroyMenu,
    DestroyWindow, DispatchMessageW, GWLP_USERDATA, GetCursorPos, GetMessageW, GetWindowLongPtrW,
    HICON, HMENU, HWND_MESSAGE, IDI_ERROR, IDI_QUESTION, IMAGE_ICON, LR_DEFAULTSIZE,
    LR_LOADFROMFILE,
    LoadIconW, LoadImageW, MF_STRING, MSG, PostMessageW, PostThreadMessageW, RegisterClassW,
    SetForegroundWindow, SetWindowLongPtrW, TPM_NONOTIFY, TPM_RETURNCMD, TPM_RIGHTBUTTON,
    TrackPopupMenu, TranslateMessage, UnregisterClassW, WM_APP, WM_COMMAND, WM_LBUTTONUP, WM_QUIT,
    WM_RBUTTONUP, WNDCLASSW, WS_OVERLAPPED,
};
use windows::core::{PCWSTR, w};

use super::{TrayCallbacks, TrayOptions};
use crate::error::ShellError;

/// Callback message the shell posts for tray icon interactions.
const TRAY_CALLBACK: u32 = WM_APP + 1;
/// Posted by `TrayController::update_icon`; wparam != 0 selects dark.
const MSG_UPDATE_ICON: u32 = WM_APP + 2;

const TRAY_ICON_ID: u32 = 1;
const CMD_EXIT: usize = 1000;
const CMD_OPEN_CONFIG: usize = 1001;

/// What `spawn_loop` hands back once the loop thread is ready.
pub(super) struct LoopHandles {
    pub hwnd: isize,
    pub thread_id: u32,
    pub join: JoinHandle<()>,
}

/// Spawn the loop thread and block until the tray icon is registered.
pub(super) fn spawn_loop(
    options: TrayOptions,
    callbacks: TrayCallbacks,
) -> Result<LoopHandles, ShellError> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(isize, u32), ShellError>>(1);

    let join = std::thread::Builder::new()
        .name("duskswitch-tray".to_string())
        .spawn(move || run_loop(options, callbacks, ready_tx))
        .map_err(|_| ShellError::LoopThreadFailed)?;

    match ready_rx.recv() {
        Ok(Ok((hwnd, thread_id))) => Ok(LoopHandles {
            hwnd,
            thread_id,
            join,
        }),
        Ok(Err(err)) => {
            let _ = join.join();
            Err(err)
        }
        // The thread died without reporting.
        Err(_) => {
            let _ = join.join();
            Err(ShellError::LoopThreadFailed)
        }
    }
}

/// Post the quit message that ends the loop thread's `GetMessageW` loop.
pub(super) fn post_quit(thread_id: u32) {
    // SAFETY: posting to a thread id is safe; a stale id fails with an
    // error we only log.
    if let Err(err) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
        tracing::warn!(target: "duskswitch::tray", "failed to post quit message: {err}");
    }
}

/// Ask the loop thread to swap the tray icon.
pub(super) fn post_icon_update(hwnd: isize, use_dark: bool) {
    let hwnd = HWND(hwnd as *mut c_void);
    // SAFETY: posting to a window handle; a destroyed window fails with an
    // error we only log.
    let result = unsafe {
        PostMessageW(
            Some(hwnd),
            MSG_UPDATE_ICON,
            WPARAM(use_dark as usize),
            LPARAM(0),
        )
    };
    if let Err(err) = result {
        tracing::warn!(target: "duskswitch::tray", "failed to post icon update: {err}");
    }
}

/// An icon handle plus whether we own it.
///
/// Stock icons from `LoadIconW` are shared and must not be destroyed.
struct OwnedIcon {
    handle: HICON,
    owned: bool,
}

impl OwnedIcon {
    fn release(&self) {
        if !self.owned || self.handle.is_invalid() {
            return;
        }
        // SAFETY: the handle came from LoadImageW and is destroyed once.
        if let Err(err) = unsafe { DestroyIcon(self.handle) } {
            tracing::debug!(target: "duskswitch::tray", "failed to destroy icon: {err}");
        }
    }
}

/// Per-window state reachable from the window procedure.
struct WndState {
    callbacks: TrayCallbacks,
    config_dir: PathBuf,
    menu: HMENU,
    icon_light: OwnedIcon,
    icon_dark: OwnedIcon,
    affinity: ThreadAffinity,
}

impl WndState {
    fn icon_for(&self, use_dark: bool) -> HICON {
        if use_dark {
            self.icon_dark.handle
        } else {
            self.icon_light.handle
        }
    }
}

/// Handles the loop thread must release before exiting.
struct Session {
    hwnd: HWND,
    instance: HINSTANCE,
    /// Backing storage for the registered class name.
    class_name: Vec<u16>,
}

fn run_loop(
    options: TrayOptions,
    callbacks: TrayCallbacks,
    ready: mpsc::SyncSender<Result<(isize, u32), ShellError>>,
) {
    let session = match setup(options, callbacks) {
        Ok(session) => session,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    // SAFETY: GetCurrentThreadId has no preconditions.
    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = ready.send(Ok((session.hwnd.0 as isize, thread_id)));

    pump_messages();
    teardown(session);
}

fn setup(options: TrayOptions, callbacks: TrayCallbacks) -> Result<Session, ShellError> {
    // SAFETY: class_name and the WNDCLASSW stay alive across the
    // registration and creation calls; the user-data box installed after
    // creation is reclaimed in teardown on this same thread.
    unsafe {
        let instance: HINSTANCE = GetModuleHandleW(None)
            .map_err(|e| ShellError::ClassRegistration(e.to_string()))?
            .into();

        // Per-process class name so two instances never collide.
        let class_name = wide(&format!("duskswitch-tray-{}", std::process::id()));

        let wc = WNDCLASSW {
            lpfnWndProc: Some(tray_wndproc),
            hInstance: instance,
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        if RegisterClassW(&wc) == 0 {
            return Err(ShellError::ClassRegistration(
                windows::core::Error::from_win32().to_string(),
            ));
        }

        let hwnd = match CreateWindowExW(
            Default::default(),
            PCWSTR(class_name.as_ptr()),
            w!("duskswitch"),
            WS_OVERLAPPED,
            0,
            0,
            0,
            0,
            Some(HWND_MESSAGE),
            None,
            Some(instance),
            None,
        ) {
            Ok(hwnd) => hwnd,
            Err(err) => {
                let _ = UnregisterClassW(PCWSTR(class_name.as_ptr()), Some(instance));
                return Err(ShellError::WindowCreation(err.to_string()));
            }
        };

        let session = Session {
            hwnd,
            instance,
            class_name,
        };

        let menu = build_menu().map_err(|err| {
            teardown_window(&session);
            err
        })?;

        let icon_light = load_icon(&options.icon_light, IDI_QUESTION);
        let icon_dark = load_icon(&options.icon_dark, IDI_ERROR);
        let initial_icon = if options.start_dark {
            icon_dark.handle
        } else {
            icon_light.handle
        };

        let state = Box::new(WndState {
            callbacks,
            config_dir: options.config_dir,
            menu,
            icon_light,
            icon_dark,
            affinity: ThreadAffinity::current(),
        });
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, Box::into_raw(state) as isize);

        let mut nid = notify_icon_data(hwnd);
        nid.uFlags = NIF_MESSAGE | NIF_ICON | NIF_TIP;
        nid.uCallbackMessage = TRAY_CALLBACK;
        nid.hIcon = initial_icon;
        copy_tooltip(&options.tooltip, &mut nid.szTip);

        if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
            let err = ShellError::IconRegistration(
                windows::core::Error::from_win32().to_string(),
            );
            teardown(session);
            return Err(err);
        }

        Ok(session)
    }
}

fn pump_messages() {
    let mut msg = MSG::default();
    loop {
        // SAFETY: msg is a valid out-pointer; a None filter receives
        // thread-posted messages including WM_QUIT.
        let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if ret.0 == 0 {
            break;
        }
        if ret.0 < 0 {
            tracing::error!(
                target: "duskswitch::tray",
                "message loop failed: {}",
                windows::core::Error::from_win32()
            );
            break;
        }
        // SAFETY: msg was filled by GetMessageW.
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Release everything, on the loop thread, in registration-reverse order:
/// tray icon, window state (icons and menu), window, class.
fn teardown(session: Session) {
    // SAFETY: runs on the thread that created all these handles; the state
    // pointer is cleared before the box is reclaimed so the window
    // procedure cannot observe a dangling pointer.
    unsafe {
        let nid = notify_icon_data(session.hwnd);
        if !Shell_NotifyIconW(NIM_DELETE, &nid).as_bool() {
            tracing::debug!(target: "duskswitch::tray", "tray icon was already removed");
        }

        let state_ptr = GetWindowLongPtrW(session.hwnd, GWLP_USERDATA);
        if state_ptr != 0 {
            SetWindowLongPtrW(session.hwnd, GWLP_USERDATA, 0);
            let state = Box::from_raw(state_ptr as *mut WndState);
            state.affinity.debug_assert_same_thread();
            state.icon_light.release();
            state.icon_dark.release();
            if let Err(err) = DestroyMenu(state.menu) {
                tracing::debug!(target: "duskswitch::tray", "failed to destroy menu: {err}");
            }
        }
    }
    teardown_window(&session);
}

fn teardown_window(session: &Session) {
    // SAFETY: same-thread teardown of handles created in setup.
    unsafe {
        if let Err(err) = DestroyWindow(session.hwnd) {
            tracing::debug!(target: "duskswitch::tray", "failed to destroy window: {err}");
        }
        if let Err(err) = UnregisterClassW(
            PCWSTR(session.class_name.as_ptr()),
            Some(session.instance),
        ) {
            tracing::debug!(target: "duskswitch::tray", "failed to unregister class: {err}");
        }
    }
}

fn build_menu() -> Result<HMENU, ShellError> {
    // SAFETY: menu item strings are static wide literals.
    unsafe {
        let menu =
            CreatePopupMenu().map_err(|e| ShellError::WindowCreation(e.to_string()))?;
        let items = [
            (CMD_OPEN_CONFIG, w!("Open Config Directory")),
            (CMD_EXIT, w!("Exit")),
        ];
        for (id, label) in items {
            if let Err(err) = AppendMenuW(menu, MF_STRING, id, label) {
                let _ = DestroyMenu(menu);
                return Err(ShellError::WindowCreation(err.to_string()));
            }
        }
        Ok(menu)
    }
}

/// Load an icon file, falling back to the given stock icon.
///
/// Never fatal: a tray icon with the wrong picture is better than no tray
/// icon. Light and dark get different stock fallbacks so the toggle stays
/// visible even with both files missing.
fn load_icon(path: &Path, fallback: PCWSTR) -> OwnedIcon {
    let wide_path = wide(path);
    // SAFETY: wide_path outlives the call.
    match unsafe {
        LoadImageW(
            None,
            PCWSTR(wide_path.as_ptr()),
            IMAGE_ICON,
            0,
            0,
            LR_LOADFROMFILE | LR_DEFAULTSIZE,
        )
    } {
        Ok(handle) if !handle.is_invalid() => OwnedIcon {
            handle: HICON(handle.0),
            owned: true,
        },
        Ok(_) | Err(_) => {
            tracing::warn!(
                target: "duskswitch::tray",
                path = %path.display(),
                "icon file unavailable, using stock icon"
            );
            // SAFETY: fallback is a stock resource id.
            let stock = unsafe { LoadIconW(None, fallback) }.unwrap_or_default();
            OwnedIcon {
                handle: stock,
                owned: false,
            }
        }
    }
}

fn notify_icon_data(hwnd: HWND) -> NOTIFYICONDATAW {
    NOTIFYICONDATAW {
        cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
        hWnd: hwnd,
        uID: TRAY_ICON_ID,
        ..Default::default()
    }
}

fn copy_tooltip(text: &str, dest: &mut [u16; 128]) {
    for (slot, unit) in dest.iter_mut().zip(text.encode_utf16().take(127)) {
        *slot = unit;
    }
}

fn wide(text: impl AsRef<std::ffi::OsStr>) -> Vec<u16> {
    text.as_ref().encode_wide().chain(once(0)).collect()
}

unsafe extern "system" fn tray_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    // SAFETY: the pointer is either null (before installation or after
    // teardown cleared it) or the live box installed in setup.
    let state_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *mut WndState;
    if state_ptr.is_null() {
        return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
    }
    let state = unsafe { &*state_ptr };

    match msg {
        TRAY_CALLBACK => {
            match lparam.0 as u32 {
                WM_LBUTTONUP => {
                    tracing::debug!(target: "duskswitch::tray", "tray icon activated");
                    let on_activate = state.callbacks.on_activate.clone();
                    WorkerPool::global().spawn(move || on_activate());
                }
                WM_RBUTTONUP => show_menu(hwnd, state),
                _ => {}
            }
            LRESULT(0)
        }
        MSG_UPDATE_ICON => {
            apply_icon(hwnd, state, wparam.0 != 0);
            LRESULT(0)
        }
        WM_COMMAND => {
            dispatch_command(state, wparam.0 & 0xFFFF);
            LRESULT(0)
        }
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

fn show_menu(hwnd: HWND, state: &WndState) {
    // SAFETY: menu and window handles are live while the state box is
    // installed; the foreground call is required so the menu dismisses on
    // an outside click.
    unsafe {
        let _ = SetForegroundWindow(hwnd);
        let mut point = POINT::default();
        if let Err(err) = GetCursorPos(&mut point) {
            tracing::warn!(target: "duskswitch::tray", "failed to read cursor position: {err}");
            return;
        }
        let cmd = TrackPopupMenu(
            state.menu,
            TPM_RETURNCMD | TPM_RIGHTBUTTON | TPM_NONOTIFY,
            point.x,
            point.y,
            0,
            hwnd,
            None,
        );
        if cmd.0 != 0 {
            dispatch_command(state, cmd.0 as usize);
        }
    }
}

fn apply_icon(hwnd: HWND, state: &WndState, use_dark: bool) {
    let icon = state.icon_for(use_dark);
    if icon.is_invalid() {
        return;
    }
    let mut nid = notify_icon_data(hwnd);
    nid.uFlags = NIF_ICON;
    nid.hIcon = icon;
    // SAFETY: nid references only live handles.
    if !unsafe { Shell_NotifyIconW(NIM_MODIFY, &nid) }.as_bool() {
        tracing::warn!(target: "duskswitch::tray", "failed to update tray icon");
    }
}

fn dispatch_command(state: &WndState, cmd: usize) {
    match cmd {
        CMD_EXIT => {
            tracing::debug!(target: "duskswitch::tray", "exit selected from menu");
            let on_exit = &state.callbacks.on_exit_requested;
            // Runs synchronously on the loop thread; a panicking callback
            // must not unwind across the window procedure.
            if std::panic::catch_unwind(AssertUnwindSafe(|| on_exit())).is_err() {
                tracing::error!(target: "duskswitch::tray", "exit callback panicked");
            }
        }
        CMD_OPEN_CONFIG => {
            let dir = state.config_dir.clone();
            WorkerPool::global().spawn(move || {
                if let Err(err) = open::that(&dir) {
                    tracing::warn!(
                        target: "duskswitch::tray",
                        dir = %dir.display(),
                        "failed to open config directory: {err}"
                    );
                }
            });
        }
        other => {
            tracing::trace!(target: "duskswitch::tray", "ignoring menu command {other}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_icon_files_fall_back_to_distinct_stock_icons() {
        let light = load_icon(Path::new("definitely-missing-light.ico"), IDI_QUESTION);
        let dark = load_icon(Path::new("definitely-missing-dark.ico"), IDI_ERROR);

        assert!(!light.owned);
        assert!(!dark.owned);
        assert!(!light.handle.is_invalid());
        assert!(!dark.handle.is_invalid());
        assert_ne!(light.handle.0, dark.handle.0);
    }
}
