//! Windows registry theme flag backend.
//!
//! The appearance flags live as `REG_DWORD` values under the per-user
//! `Themes\Personalize` key. After a write, an `ImmersiveColorSet`
//! `WM_SETTINGCHANGE` broadcast tells running applications to re-read the
//! flags; the broadcast is best-effort and bounded by a timeout so a hung
//! window cannot stall the toggle.

use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, LPARAM, WIN32_ERROR, WPARAM};
use windows::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_READ, KEY_SET_VALUE, REG_DWORD, REG_SAM_FLAGS, REG_VALUE_TYPE,
    RegCloseKey, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    HWND_BROADCAST, SMTO_ABORTIFHUNG, SendMessageTimeoutW, WM_SETTINGCHANGE,
};
use windows::core::{PCWSTR, w};

use super::{ThemeFlag, ThemeFlags};
use crate::error::ThemeError;

const PERSONALIZE_KEY: PCWSTR =
    w!(r"Software\Microsoft\Windows\CurrentVersion\Themes\Personalize");
const PERSONALIZE_KEY_NAME: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Themes\Personalize";

/// Milliseconds each broadcast recipient gets before being skipped.
const BROADCAST_TIMEOUT_MS: u32 = 5000;

/// [`ThemeFlags`] backend over the per-user registry.
#[derive(Debug, Default)]
pub struct RegistryFlags;

impl RegistryFlags {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, access: REG_SAM_FLAGS) -> Result<Option<OwnedKey>, ThemeError> {
        let mut key = HKEY::default();
        // SAFETY: out-pointer is valid for the duration of the call; the
        // returned handle is owned by the guard.
        let status =
            unsafe { RegOpenKeyExW(HKEY_CURRENT_USER, PERSONALIZE_KEY, 0, access, &mut key) };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status.is_err() {
            return Err(ThemeError::open_key(
                PERSONALIZE_KEY_NAME,
                describe_status(status),
            ));
        }
        Ok(Some(OwnedKey(key)))
    }
}

fn value_name(flag: ThemeFlag) -> PCWSTR {
    match flag {
        ThemeFlag::System => w!("SystemUsesLightTheme"),
        ThemeFlag::Apps => w!("AppsUseLightTheme"),
    }
}

fn describe_status(status: WIN32_ERROR) -> String {
    windows::core::Error::from(status).message()
}

/// Registry key handle closed on drop.
struct OwnedKey(HKEY);

impl Drop for OwnedKey {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by `RegistryFlags::open` and is
        // closed exactly once here.
        let status = unsafe { RegCloseKey(self.0) };
        if status.is_err() {
            tracing::debug!(
                target: "duskswitch::theme",
                "failed to close registry key: {}",
                describe_status(status)
            );
        }
    }
}

impl ThemeFlags for RegistryFlags {
    fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, ThemeError> {
        let Some(key) = self.open(KEY_READ)? else {
            // The whole key is absent; treat like a missing value.
            return Ok(None);
        };

        let mut value_type = REG_VALUE_TYPE::default();
        let mut data = [0u8; 4];
        let mut size = data.len() as u32;
        // SAFETY: all out-pointers are valid for the duration of the call
        // and `size` matches the buffer length.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                value_name(flag),
                None,
                Some(&mut value_type),
                Some(data.as_mut_ptr()),
                Some(&mut size),
            )
        };

        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status.is_err() {
            return Err(ThemeError::read_flag(
                flag.value_name(),
                describe_status(status),
            ));
        }
        if value_type != REG_DWORD || size != 4 {
            tracing::warn!(
                target: "duskswitch::theme",
                "theme flag '{}' has unexpected type {:?}, treating as missing",
                flag.value_name(),
                value_type
            );
            return Ok(None);
        }
        Ok(Some(u32::from_le_bytes(data)))
    }

    fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), ThemeError> {
        let key = self.open(KEY_SET_VALUE)?.ok_or_else(|| {
            ThemeError::open_key(PERSONALIZE_KEY_NAME, "key does not exist")
        })?;

        // SAFETY: the data slice lives across the call.
        let status = unsafe {
            RegSetValueExW(
                key.0,
                value_name(flag),
                0,
                REG_DWORD,
                Some(&value.to_le_bytes()),
            )
        };
        if status.is_err() {
            return Err(ThemeError::write_flag(
                flag.value_name(),
                describe_status(status),
            ));
        }
        Ok(())
    }

    fn broadcast_change(&self) {
        // SAFETY: the string literal outlives the call; lpdwresult is
        // optional and omitted.
        let result = unsafe {
            SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(w!("ImmersiveColorSet").as_ptr() as isize),
                SMTO_ABORTIFHUNG,
                BROADCAST_TIMEOUT_MS,
                None,
            )
        };
        if result.0 == 0 {
            let err = windows::core::Error::from_win32();
            tracing::warn!(
                target: "duskswitch::theme",
                "settings-change broadcast failed: {err}"
            );
        }
    }
}

/// The store most callers want on Windows.
pub type RegistryThemeStore = super::ThemeStore<RegistryFlags>;

impl Default for RegistryThemeStore {
    fn default() -> Self {
        Self::new(RegistryFlags::new())
    }
}
