// crates/ledgerflow-core/src/runtime/clock.rs
// ============================================================================
// Module: Ledgerflow Clocks
// Description: System and manual clock implementations.
// Purpose: Supply engine time from the host or from tests.
// Dependencies: crate::interfaces, time
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads UTC wall-clock time. [`ManualClock`] holds a settable
//! instant so tests can step through timeouts deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use time::OffsetDateTime;

use crate::core::Timestamp;
use crate::interfaces::Clock;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let millis = i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX);
        Timestamp::from_unix_millis(millis)
    }
}

/// Settable clock shared across clones.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current unix milliseconds.
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock fixed at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by whole hours.
    pub fn advance_hours(&self, hours: u32) {
        let next = self.now().plus_hours(hours);
        self.set(next);
    }

    /// Advances the clock by milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
