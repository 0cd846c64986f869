//! Wall-clock source for telemetry timestamps
//!
//! Session logs record local wall time, so everything that stamps an event or
//! names a file reads it through a [`Clock`]. Tests swap in a [`FixedClock`]
//! to get deterministic file names and log lines.

use chrono::{Local, NaiveDateTime};
use std::sync::{Arc, Mutex};

/// Local wall-clock time without an attached zone
pub type LocalTimestamp = NaiveDateTime;

/// Format used inside session log lines (millisecond precision)
pub const LOG_TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Format used in session file names
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> LocalTimestamp;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> LocalTimestamp {
        Local::now().naive_local()
    }
}

/// Clock that always reports a preset instant until moved
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: Arc<Mutex<LocalTimestamp>>,
}

impl FixedClock {
    /// Create a clock frozen at `at`
    pub fn new(at: LocalTimestamp) -> Self {
        Self {
            at: Arc::new(Mutex::new(at)),
        }
    }

    /// Move the clock to a new instant; clones observe the change
    pub fn set(&self, at: LocalTimestamp) {
        *self.at.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: chrono::Duration) {
        let mut at = self.at.lock().unwrap_or_else(|e| e.into_inner());
        *at += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> LocalTimestamp {
        *self.at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Default clock handle backed by the system time
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// `HH:MM:SS.mmm`
pub fn format_log_time(at: &LocalTimestamp) -> String {
    at.format(LOG_TIME_FORMAT).to_string()
}

/// `YYYYMMDD_HHMMSS`
pub fn format_file_stamp(at: &LocalTimestamp) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}
