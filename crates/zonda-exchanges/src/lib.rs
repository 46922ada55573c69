//! Exchange adapters for the zonda exchange history exporter.
//!
//! Each adapter implements [`ExchangeAdapter`], turning a venue's signed
//! REST endpoints into streams of normalized [`zonda_types::Record`]s. The
//! [`AdapterRegistry`] holds the built-in adapters and [`run_session`] fans
//! a [`FetchPlan`] out across exchanges, accounts, and record kinds.
//!
//! Built-in venues:
//!
//! - [`BinancePmAdapter`] - Binance portfolio margin (PAPI + SAPI)
//! - [`OkxAdapter`] - OKX v5

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod adapter;
mod binance_pm;
mod error;
mod normalize;
mod okx;
mod session;
mod sign;

pub use adapter::{AdapterRegistry, ExchangeAdapter, FetchContext, RecordStream};
pub use binance_pm::BinancePmAdapter;
pub use error::ExchangeError;
pub use normalize::{
    NormalizeError, decimal_field, event_time_ms, ms_field, ms_field_with_format,
    opt_decimal_field, opt_str_field, str_field, string_field,
};
pub use okx::OkxAdapter;
pub use session::{FetchPlan, FetchUnit, UnitOutcome, UnitReport, run_session};
