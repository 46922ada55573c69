//! Error types for zonda-types.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Error returned when a time string cannot be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unparseable time '{0}', expected YYYY-MM-DD, 'YYYY-MM-DD HH:MM:SS' or ISO-8601")]
pub struct TimeParseError(pub String);

/// Errors for invalid time ranges and window parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeRangeError {
    /// Start time is after end time. Never silently swapped.
    #[error("invalid time range: {start} > {end}")]
    Inverted {
        /// The start of the range.
        start: DateTime<Utc>,
        /// The end of the range.
        end: DateTime<Utc>,
    },

    /// Window width must be strictly positive.
    #[error("window width must be positive, got {0}")]
    NonPositiveWidth(TimeDelta),

    /// Overlap must be shorter than the window width or iteration cannot advance.
    #[error("overlap {overlap} must be shorter than window width {width}")]
    OverlapExceedsWidth {
        /// The requested overlap.
        overlap: TimeDelta,
        /// The window width.
        width: TimeDelta,
    },

    /// Overlap must not be negative.
    #[error("overlap must not be negative, got {0}")]
    NegativeOverlap(TimeDelta),
}
