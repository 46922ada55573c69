//! Time parsing, epoch conversion, and fetch-window planning.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::{TimeParseError, TimeRangeError};

/// The ISO-8601 rendering used for every record `datetime` field.
const ISO8601_MS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Accepted input formats for [`parse_time`], tried in order.
const INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
];

/// Parses a time string as UTC.
///
/// Accepts `YYYY-MM-DD` (midnight), `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SSZ`, and millisecond-precision ISO-8601 with a `Z`
/// suffix. Naive inputs are interpreted as UTC.
///
/// # Errors
///
/// Returns [`TimeParseError`] if no format matches.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight should be valid");
        return Ok(midnight.and_utc());
    }

    for format in INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(dt.and_utc());
        }
    }

    Err(TimeParseError(input.to_string()))
}

/// Converts a UTC datetime to epoch milliseconds.
#[must_use]
pub fn to_timestamp_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Converts epoch milliseconds to a UTC datetime.
///
/// Returns `None` for values outside chrono's representable range.
#[must_use]
pub fn from_timestamp_ms(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp_ms)
}

/// Formats a UTC datetime as ISO-8601 with millisecond precision and a `Z`
/// suffix, e.g. `2022-01-01T00:00:00.000Z`.
#[must_use]
pub fn format_iso8601(dt: DateTime<Utc>) -> String {
    dt.format(ISO8601_MS).to_string()
}

/// An absolute half-open time interval `[start, end)` for data retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start of the range (inclusive).
    pub start: DateTime<Utc>,
    /// End of the range (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new time range, validating that `start <= end`.
    ///
    /// An empty range (`start == end`) is valid and plans zero windows.
    ///
    /// # Errors
    ///
    /// Returns [`TimeRangeError::Inverted`] if `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        if start > end {
            return Err(TimeRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Returns the total duration of the range.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    /// Returns true if the range spans no time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Start of the range as epoch milliseconds.
    #[must_use]
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End of the range as epoch milliseconds.
    #[must_use]
    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Slices the range into contiguous sub-windows no wider than `width`.
    ///
    /// # Errors
    ///
    /// Returns an error if `width` is not strictly positive.
    pub fn windows(&self, width: TimeDelta) -> Result<WindowIter, TimeRangeError> {
        self.windows_with_overlap(width, TimeDelta::zero())
    }

    /// Slices the range into sub-windows no wider than `width`, each window
    /// starting `overlap` before the previous one ended.
    ///
    /// A positive overlap re-scans a trailing slice of the previous window so
    /// records inserted near a boundary with skewed timestamps are not
    /// missed; callers dedup the re-fetched items.
    ///
    /// # Errors
    ///
    /// Returns an error if `width` is not strictly positive, if `overlap` is
    /// negative, or if `overlap >= width` (iteration could not advance).
    pub fn windows_with_overlap(
        &self,
        width: TimeDelta,
        overlap: TimeDelta,
    ) -> Result<WindowIter, TimeRangeError> {
        if width <= TimeDelta::zero() {
            return Err(TimeRangeError::NonPositiveWidth(width));
        }
        if overlap < TimeDelta::zero() {
            return Err(TimeRangeError::NegativeOverlap(overlap));
        }
        if overlap >= width {
            return Err(TimeRangeError::OverlapExceedsWidth { overlap, width });
        }
        Ok(WindowIter {
            current: self.start,
            end: self.end,
            width,
            overlap,
            done: self.start >= self.end,
        })
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// One bounded sub-window of a [`TimeRange`], half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Window start (inclusive).
    pub start: DateTime<Utc>,
    /// Window end (exclusive).
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window start as epoch milliseconds, the form exchange APIs take.
    #[must_use]
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Window end as epoch milliseconds.
    #[must_use]
    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Returns the width of the window.
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lazy iterator over the sub-windows of a [`TimeRange`].
///
/// Stateless over its pure inputs: cloning yields an independent iterator
/// that re-enumerates the same windows from the beginning of its remainder.
/// Iteration stops after the window whose end reaches the range end, so a
/// positive overlap cannot loop on the final boundary.
#[derive(Debug, Clone)]
pub struct WindowIter {
    current: DateTime<Utc>,
    end: DateTime<Utc>,
    width: TimeDelta,
    overlap: TimeDelta,
    done: bool,
}

impl Iterator for WindowIter {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let window_end = std::cmp::min(self.current + self.width, self.end);
        let window = Window {
            start: self.current,
            end: window_end,
        };

        if window_end >= self.end {
            self.done = true;
        } else {
            self.current = window_end - self.overlap;
        }

        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for WindowIter {}

impl WindowIter {
    /// Number of windows left to yield.
    fn remaining(&self) -> usize {
        if self.done {
            return 0;
        }
        let remaining_ms = (self.end - self.current).num_milliseconds();
        let width_ms = self.width.num_milliseconds();
        if remaining_ms <= width_ms {
            return 1;
        }
        let step_ms = width_ms - self.overlap.num_milliseconds();
        let after_first = remaining_ms - width_ms;
        // Both operands are strictly positive here, so the unsigned
        // (stable) div_ceil matches the signed result exactly.
        (1 + (after_first as u64).div_ceil(step_ms as u64)) as usize
    }
}
