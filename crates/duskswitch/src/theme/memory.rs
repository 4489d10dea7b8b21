//! In-memory theme flag backend.
//!
//! Used by tests and as a stand-in on platforms without an OS settings
//! store. Supports failure injection so the degraded-read and hard-write
//! error paths can be exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{ThemeFlag, ThemeFlags};
use crate::error::ThemeError;

/// A [`ThemeFlags`] backend over a plain map.
#[derive(Debug, Default)]
pub struct MemoryFlags {
    values: Mutex<HashMap<ThemeFlag, u32>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    broadcasts: AtomicUsize,
}

impl MemoryFlags {
    /// Create a backend with no flags set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag value directly, bypassing failure injection.
    pub fn set(&self, flag: ThemeFlag, value: u32) {
        self.values.lock().insert(flag, value);
    }

    /// Read a flag value directly, bypassing failure injection.
    pub fn get(&self, flag: ThemeFlag) -> Option<u32> {
        self.values.lock().get(&flag).copied()
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times a settings change was broadcast.
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

impl ThemeFlags for MemoryFlags {
    fn read_flag(&self, flag: ThemeFlag) -> Result<Option<u32>, ThemeError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ThemeError::read_flag(flag.value_name(), "injected failure"));
        }
        Ok(self.get(flag))
    }

    fn write_flag(&self, flag: ThemeFlag, value: u32) -> Result<(), ThemeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ThemeError::write_flag(
                flag.value_name(),
                "injected failure",
            ));
        }
        self.set(flag, value);
        Ok(())
    }

    fn broadcast_change(&self) {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
    }
}
