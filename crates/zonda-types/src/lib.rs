//! Core types for the zonda exchange history exporter.
//!
//! This crate provides the fundamental data structures used throughout zonda:
//!
//! - [`TradeRecord`], [`FundingRecord`], [`TransferRecord`], [`FeeRecord`] -
//!   the unified record schema every exchange payload is normalized into
//! - [`Record`] / [`RecordKind`] - sum type and kind identifier over the four
//! - [`EventTime`] - an epoch-millisecond timestamp paired with its ISO-8601
//!   rendering, constructed so the two can never disagree
//! - [`TimeRange`] / [`WindowIter`] - bounded time-window planning for
//!   incremental fetching

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod record;
mod time;

pub use error::{TimeParseError, TimeRangeError};
pub use record::{
    EventTime, FeeKind, FeeRecord, FundingRecord, Liquidity, OrderType, PositionSide, Record,
    RecordKind, RecordKindParseError, RecordMeta, TradeRecord, TradeSide, TransferDirection,
    TransferRecord, TransferStatus,
};
pub use time::{
    TimeRange, Window, WindowIter, format_iso8601, from_timestamp_ms, parse_time, to_timestamp_ms,
};
