// crates/ledgerflow-core/src/core/time.rs
// ============================================================================
// Module: Ledgerflow Time Model
// Description: Canonical timestamp and date-range values.
// Purpose: Keep engine time explicit so transitions are replayable and testable.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Ledgerflow stores every instant as unix epoch milliseconds. Engines never
//! read wall-clock time directly; they ask a [`crate::interfaces::Clock`] and
//! carry the resulting [`Timestamp`] through the transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per hour.
pub const MILLIS_PER_HOUR: i64 = 3_600_000;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch milliseconds.
///
/// # Invariants
/// - Values are supplied by a clock or by storage; no range validation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Epoch origin.
    pub const EPOCH: Self = Self(0);

    /// Wraps unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted forward by whole hours, saturating.
    #[must_use]
    pub const fn plus_hours(self, hours: u32) -> Self {
        Self(self.0.saturating_add((hours as i64).saturating_mul(MILLIS_PER_HOUR)))
    }

    /// Returns the later of `self` and one millisecond after `previous`.
    #[must_use]
    pub const fn strictly_after(self, previous: Self) -> Self {
        let floor = previous.0.saturating_add(1);
        if self.0 >= floor { self } else { Self(floor) }
    }

    /// Milliseconds elapsed from `earlier` to `self`, negative when `earlier` is later.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Converts to a UTC date-time when representable.
    #[must_use]
    pub fn to_utc(self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000).ok()
    }

    /// Renders the `YYYYMMDDhhmmss` stamp used in instance numbers.
    #[must_use]
    pub fn compact_stamp(self) -> String {
        self.to_utc().map_or_else(
            || format!("{:014}", self.0.max(0)),
            |utc| {
                format!(
                    "{:04}{:02}{:02}{:02}{:02}{:02}",
                    utc.year(),
                    u8::from(utc.month()),
                    utc.day(),
                    utc.hour(),
                    utc.minute(),
                    utc.second()
                )
            },
        )
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_utc().and_then(|utc| utc.format(&Rfc3339).ok()) {
            Some(rendered) => f.write_str(&rendered),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ============================================================================
// SECTION: Date Range
// ============================================================================

/// Half-open time range `[from, to)`; either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub from: Option<Timestamp>,
    /// Exclusive upper bound.
    pub to: Option<Timestamp>,
}

impl DateRange {
    /// Range covering all time.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// Returns true when `at` lies inside the range.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_after_bumps_equal_and_earlier_values() {
        let previous = Timestamp::from_unix_millis(1_000);
        assert_eq!(Timestamp::from_unix_millis(1_000).strictly_after(previous).as_unix_millis(), 1_001);
        assert_eq!(Timestamp::from_unix_millis(900).strictly_after(previous).as_unix_millis(), 1_001);
        assert_eq!(Timestamp::from_unix_millis(5_000).strictly_after(previous).as_unix_millis(), 5_000);
    }

    #[test]
    fn compact_stamp_renders_utc_fields() {
        // 2024-03-05T06:07:08Z
        let ts = Timestamp::from_unix_millis(1_709_618_828_000);
        assert_eq!(ts.compact_stamp(), "20240305060708");
    }

    #[test]
    fn date_range_is_half_open() {
        let range = DateRange {
            from: Some(Timestamp::from_unix_millis(10)),
            to: Some(Timestamp::from_unix_millis(20)),
        };
        assert!(range.contains(Timestamp::from_unix_millis(10)));
        assert!(!range.contains(Timestamp::from_unix_millis(20)));
        assert!(DateRange::unbounded().contains(Timestamp::EPOCH));
    }
}
