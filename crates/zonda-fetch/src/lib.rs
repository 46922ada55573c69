//! The incremental fetch engine for the zonda exchange history exporter.
//!
//! This crate combines the pieces a fetch session is built from:
//!
//! - [`RateLimiter`] - per-account quota tracking with cooperative throttling
//! - [`RequestExecutor`] - retrying GET execution with exponential backoff
//! - [`redact_params`] - credential redaction for diagnostic output
//! - [`paginate_cursor`] / [`paginate_last_id`] / [`paginate_windows`] -
//!   lazy pagination strategies over page-fetch functions

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod executor;
mod page;
mod rate_limit;
mod redact;

pub use executor::{ExecutorConfig, FetchError, RateLimitHeaders, RequestExecutor};
pub use page::{
    Page, item_key, key_field, paginate_cursor, paginate_last_id, paginate_windows, pivot_key,
};
pub use rate_limit::{LOW_WATER_MARK, RateLimitState, RateLimitUpdate, RateLimiter};
pub use redact::{is_sensitive_param, redact_params, redact_value};
