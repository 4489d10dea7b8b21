//! Light/dark theme state.
//!
//! The OS stores the appearance as two independent flags: one for the system
//! shell (taskbar, start menu) and one for applications. [`ThemeStore`]
//! implements the policy algebra over those flags: which ones a toggle
//! touches, and how the current state is derived when they disagree or are
//! missing.
//!
//! The store is generic over a [`ThemeFlags`] backend so the algebra can be
//! exercised without an OS settings store. The real backend lives in
//! [`registry`]; tests use [`memory::MemoryFlags`].

pub mod memory;
#[cfg(target_os = "windows")]
pub mod registry;

use crate::error::ThemeError;

/// Which appearance flags a toggle operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThemePolicy {
    /// Only the system shell flag.
    SystemOnly,
    /// Only the applications flag.
    AppsOnly,
    /// Both flags together.
    #[default]
    Both,
}

impl ThemePolicy {
    /// Parse a configuration string. Unknown values map to `Both`.
    pub fn from_config_str(text: &str) -> Self {
        match text {
            "system-only" => Self::SystemOnly,
            "apps-only" => Self::AppsOnly,
            "both" => Self::Both,
            other => {
                tracing::warn!(
                    target: "duskswitch::theme",
                    "unknown theme policy '{other}', using 'both'"
                );
                Self::Both
            }
        }
    }

    /// The configuration string for this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemOnly => "system-only",
            Self::AppsOnly => "apps-only",
            Self::Both => "both",
        }
    }
}

/// One of the two OS appearance flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeFlag {
    /// The system shell flag (`SystemUsesLightTheme`).
    System,
    /// The applications flag (`AppsUseLightTheme`).
    Apps,
}

impl ThemeFlag {
    /// The OS value name for this flag.
    pub fn value_name(&self) -> &'static str {
        match self {
            Self::System => "SystemUsesLightTheme",
            Self::Apps => "AppsUseLightTheme",
        }
    }
}

/// Storage backend for the two appearance flags.
///
/// `read_flag` returns `Ok(None)` when the flag is absent or not an integer
/// value. `broadcast_change` tells the rest of the session that appearance
/// settings changed; it is best-effort and must not fail.
pub trait ThemeFlags {
    fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, ThemeError>;
    fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), ThemeError>;
    fn broadcast_change(&self);
}

/// The theme setting store: policy algebra over a [`ThemeFlags`] backend.
#[derive(Debug)]
pub struct ThemeStore<F: ThemeFlags> {
    flags: F,
}

impl<F: ThemeFlags> ThemeStore<F> {
    /// Create a store over the given backend.
    pub fn new(flags: F) -> Self {
        Self { flags }
    }

    /// Access the underlying backend.
    pub fn flags(&self) -> &F {
        &self.flags
    }

    /// Whether the light theme is currently active under the given policy.
    ///
    /// Reads degrade rather than fail: an absent flag, a read error, or
    /// (under `Both`) either flag missing all report dark, with a warning.
    /// Under `Both` the flags are combined with OR, so a half-applied state
    /// still reads as light.
    pub fn is_light_enabled(&self, policy: ThemePolicy) -> bool {
        match policy {
            ThemePolicy::SystemOnly => self.read_or_dark(ThemeFlag::System),
            ThemePolicy::AppsOnly => self.read_or_dark(ThemeFlag::Apps),
            ThemePolicy::Both => {
                let system = self.flags.read_flag(ThemeFlag::System);
                let apps = self.flags.read_flag(ThemeFlag::Apps);
                match (system, apps) {
                    (Ok(Some(s)), Ok(Some(a))) => s != 0 || a != 0,
                    (system, apps) => {
                        tracing::warn!(
                            target: "duskswitch::theme",
                            "theme flags unreadable (system: {}, apps: {}), reporting dark",
                            describe_read(&system),
                            describe_read(&apps),
                        );
                        false
                    }
                }
            }
        }
    }

    /// Toggle the theme under the given policy.
    ///
    /// Returns the new state (`true` = light). A flag that cannot be read is
    /// a hard error here, because toggling against an unknown state would
    /// flip it arbitrarily; an *absent* flag counts as dark. Write failures
    /// are hard errors. The settings-change broadcast afterwards is
    /// best-effort.
    pub fn toggle(&self, policy: ThemePolicy) -> Result<bool, ThemeError> {
        let current = match policy {
            ThemePolicy::SystemOnly => self.read_defaulting_dark(ThemeFlag::System)?,
            ThemePolicy::AppsOnly => self.read_defaulting_dark(ThemeFlag::Apps)?,
            ThemePolicy::Both => {
                self.read_defaulting_dark(ThemeFlag::System)?
                    || self.read_defaulting_dark(ThemeFlag::Apps)?
            }
        };
        let target = !current;
        self.set_explicit(target, policy)?;
        Ok(target)
    }

    /// Set the theme to an explicit state under the given policy.
    ///
    /// Under `Both`, the system flag is written first, then the applications
    /// flag; there is no transaction, so a failure in between leaves a mixed
    /// state that the OR read rule still resolves. Broadcasts the change on
    /// success.
    pub fn set_explicit(&self, is_light: bool, policy: ThemePolicy) -> Result<(), ThemeError> {
        let value = if is_light { 1 } else { 0 };
        match policy {
            ThemePolicy::SystemOnly => self.flags.write_flag(ThemeFlag::System, value)?,
            ThemePolicy::AppsOnly => self.flags.write_flag(ThemeFlag::Apps, value)?,
            ThemePolicy::Both => {
                self.flags.write_flag(ThemeFlag::System, value)?;
                self.flags.write_flag(ThemeFlag::Apps, value)?;
            }
        }
        tracing::info!(
            target: "duskswitch::theme",
            policy = policy.as_str(),
            "theme set to {}",
            if is_light { "light" } else { "dark" }
        );
        self.flags.broadcast_change();
        Ok(())
    }

    fn read_or_dark(&self, flag: ThemeFlag) -> bool {
        match self.flags.read_flag(flag) {
            Ok(Some(value)) => value != 0,
            Ok(None) => {
                tracing::warn!(
                    target: "duskswitch::theme",
                    "theme flag '{}' missing, reporting dark",
                    flag.value_name()
                );
                false
            }
            Err(err) => {
                tracing::warn!(
                    target: "duskswitch::theme",
                    "theme flag '{}' unreadable, reporting dark: {err}",
                    flag.value_name()
                );
                false
            }
        }
    }

    fn read_defaulting_dark(&self, flag: ThemeFlag) -> Result<bool, ThemeError> {
        Ok(self.flags.read_flag(flag)?.unwrap_or(0) != 0)
    }
}

fn describe_read(result: &Result<Option<u32>, ThemeError>) -> &'static str {
    match result {
        Ok(Some(_)) => "ok",
        Ok(None) => "missing",
        Err(_) => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryFlags;
    use super::*;

    fn store() -> ThemeStore<MemoryFlags> {
        ThemeStore::new(MemoryFlags::new())
    }

    #[test]
    fn test_policy_strings() {
        assert_eq!(
            ThemePolicy::from_config_str("system-only"),
            ThemePolicy::SystemOnly
        );
        assert_eq!(
            ThemePolicy::from_config_str("apps-only"),
            ThemePolicy::AppsOnly
        );
        assert_eq!(ThemePolicy::from_config_str("both"), ThemePolicy::Both);
        assert_eq!(ThemePolicy::from_config_str("garbage"), ThemePolicy::Both);
        assert_eq!(ThemePolicy::SystemOnly.as_str(), "system-only");
    }

    #[test]
    fn test_read_both_flags_light() {
        let store = store();
        store.flags().set(ThemeFlag::System, 1);
        store.flags().set(ThemeFlag::Apps, 1);
        assert!(store.is_light_enabled(ThemePolicy::Both));
    }

    #[test]
    fn test_read_both_flags_dark() {
        let store = store();
        store.flags().set(ThemeFlag::System, 0);
        store.flags().set(ThemeFlag::Apps, 0);
        assert!(!store.is_light_enabled(ThemePolicy::Both));
    }

    #[test]
    fn test_read_mixed_flags_is_light_under_both() {
        let store = store();
        store.flags().set(ThemeFlag::System, 0);
        store.flags().set(ThemeFlag::Apps, 1);
        assert!(store.is_light_enabled(ThemePolicy::Both));
        assert!(!store.is_light_enabled(ThemePolicy::SystemOnly));
        assert!(store.is_light_enabled(ThemePolicy::AppsOnly));
    }

    #[test]
    fn test_read_missing_flag_reports_dark() {
        let store = store();
        store.flags().set(ThemeFlag::System, 1);
        // Apps flag absent: Both degrades to dark, SystemOnly still reads.
        assert!(!store.is_light_enabled(ThemePolicy::Both));
        assert!(store.is_light_enabled(ThemePolicy::SystemOnly));
        assert!(!store.is_light_enabled(ThemePolicy::AppsOnly));
    }

    #[test]
    fn test_read_error_reports_dark() {
        let store = store();
        store.flags().set(ThemeFlag::System, 1);
        store.flags().fail_reads(true);
        assert!(!store.is_light_enabled(ThemePolicy::SystemOnly));
        assert!(!store.is_light_enabled(ThemePolicy::Both));
    }

    #[test]
    fn test_double_toggle_round_trips() {
        for policy in [
            ThemePolicy::SystemOnly,
            ThemePolicy::AppsOnly,
            ThemePolicy::Both,
        ] {
            for initial in [0u32, 1u32] {
                let store = store();
                store.flags().set(ThemeFlag::System, initial);
                store.flags().set(ThemeFlag::Apps, initial);
                let before = store.is_light_enabled(policy);

                let first = store.toggle(policy).unwrap();
                assert_eq!(first, !before, "policy {policy:?} initial {initial}");
                let second = store.toggle(policy).unwrap();
                assert_eq!(second, before, "policy {policy:?} initial {initial}");
                assert_eq!(store.is_light_enabled(policy), before);
            }
        }
    }

    #[test]
    fn test_toggle_missing_flags_sets_light() {
        // Absent flags count as dark, so the first toggle turns light on.
        let store = store();
        assert!(store.toggle(ThemePolicy::Both).unwrap());
        assert_eq!(store.flags().get(ThemeFlag::System), Some(1));
        assert_eq!(store.flags().get(ThemeFlag::Apps), Some(1));
    }

    #[test]
    fn test_toggle_mixed_state_converges_under_both() {
        let store = store();
        store.flags().set(ThemeFlag::System, 0);
        store.flags().set(ThemeFlag::Apps, 1);
        // Mixed reads as light; toggling writes dark to both.
        assert!(!store.toggle(ThemePolicy::Both).unwrap());
        assert_eq!(store.flags().get(ThemeFlag::System), Some(0));
        assert_eq!(store.flags().get(ThemeFlag::Apps), Some(0));
    }

    #[test]
    fn test_toggle_respects_policy_scope() {
        let store = store();
        store.flags().set(ThemeFlag::System, 0);
        store.flags().set(ThemeFlag::Apps, 0);
        store.toggle(ThemePolicy::AppsOnly).unwrap();
        assert_eq!(store.flags().get(ThemeFlag::System), Some(0));
        assert_eq!(store.flags().get(ThemeFlag::Apps), Some(1));
    }

    #[test]
    fn test_write_failure_is_hard_error() {
        let store = store();
        store.flags().set(ThemeFlag::System, 0);
        store.flags().set(ThemeFlag::Apps, 0);
        store.flags().fail_writes(true);
        assert!(store.toggle(ThemePolicy::Both).is_err());
        assert!(store.set_explicit(true, ThemePolicy::SystemOnly).is_err());
    }

    #[test]
    fn test_successful_write_broadcasts_once() {
        let store = store();
        store.set_explicit(true, ThemePolicy::Both).unwrap();
        assert_eq!(store.flags().broadcast_count(), 1);
        store.toggle(ThemePolicy::Both).unwrap();
        assert_eq!(store.flags().broadcast_count(), 2);
    }

    #[test]
    fn test_failed_write_does_not_broadcast() {
        let store = store();
        store.flags().fail_writes(true);
        let _ = store.set_explicit(true, ThemePolicy::Both);
        assert_eq!(store.flags().broadcast_count(), 0);
    }
}
