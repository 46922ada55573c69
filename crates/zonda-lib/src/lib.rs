//! Incremental fetch engine and exporters for crypto exchange account history.
//!
//! This is a facade crate that re-exports functionality from the zonda
//! workspace crates for convenient access.
//!
//! # Quick Start
//!
//! ```ignore
//! use zonda_lib::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yml")?;
//!     let registry = AdapterRegistry::global();
//!
//!     let range = TimeRange::new(
//!         parse_time("2024-01-01")?,
//!         parse_time("2024-02-01")?,
//!     )?;
//!     let mut plan = FetchPlan::new(range);
//!     plan.exchanges = vec!["binance_pm".to_string()];
//!
//!     let exporter = Exporter::new("./output", ExportFormat::Csv);
//!     let reports = run_session(registry, &config, &plan, |unit, records| {
//!         let exporter = exporter.clone();
//!         async move {
//!             exporter
//!                 .export_unit(&unit.exchange, &unit.account, unit.kind, &range, records)
//!                 .await
//!         }
//!     })
//!     .await?;
//!
//!     for report in &reports {
//!         println!("{}: {:?}", report.unit, report.outcome);
//!     }
//!     Ok(())
//! }
//! ```

#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/zonda/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the record schema and time tooling
pub use zonda_types::*;

// Re-export configuration loading
pub use zonda_config::{
    AccountConfig, Config, ConfigError, ExchangeConfig, GlobalConfig, RateLimitConfig,
};

// Re-export the fetch engine
#[cfg(feature = "fetch")]
pub use zonda_fetch::{
    ExecutorConfig, FetchError, Page, RateLimitHeaders, RateLimitState, RateLimitUpdate,
    RateLimiter, RequestExecutor, paginate_cursor, paginate_last_id, paginate_windows,
    redact_params, redact_value,
};

// Re-export the exchange adapters and session orchestration
#[cfg(feature = "exchanges")]
pub use zonda_exchanges::{
    AdapterRegistry, BinancePmAdapter, ExchangeAdapter, ExchangeError, FetchContext, FetchPlan,
    FetchUnit, OkxAdapter, RecordStream, UnitOutcome, UnitReport, run_session,
};

// Re-export the exporters
#[cfg(feature = "export")]
pub use zonda_export::{ExportError, ExportFormat, Exporter, RecordWriter};

/// Prelude module for convenient imports.
///
/// ```
/// use zonda_lib::prelude::*;
/// ```
pub mod prelude {
    pub use zonda_config::{AccountConfig, Config, ExchangeConfig};
    pub use zonda_types::{
        EventTime, FeeRecord, FundingRecord, Record, RecordKind, RecordMeta, TimeRange,
        TradeRecord, TransferRecord, parse_time,
    };

    #[cfg(feature = "fetch")]
    pub use zonda_fetch::{RateLimiter, RequestExecutor};

    #[cfg(feature = "exchanges")]
    pub use zonda_exchanges::{
        AdapterRegistry, ExchangeAdapter, FetchPlan, FetchUnit, RecordStream, UnitOutcome,
        UnitReport, run_session,
    };

    #[cfg(feature = "export")]
    pub use zonda_export::{ExportFormat, Exporter};
}
