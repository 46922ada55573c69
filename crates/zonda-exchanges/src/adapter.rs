//! The exchange adapter trait and the adapter registry.

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::TimeDelta;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::warn;
use zonda_config::AccountConfig;
use zonda_fetch::{RateLimitHeaders, RequestExecutor};
use zonda_types::{Record, RecordKind, TimeRange};

use crate::binance_pm::BinancePmAdapter;
use crate::error::ExchangeError;
use crate::normalize::NormalizeError;
use crate::okx::OkxAdapter;

/// A lazy, single-pass stream of unified records. Dropping it early stops
/// fetching; re-enumeration means a fresh fetch.
pub type RecordStream = BoxStream<'static, Result<Record, ExchangeError>>;

/// Everything an adapter needs to fetch one account's history.
///
/// The executor is shared by all fetch units of the account, so its rate
/// limiter sees every request the account makes.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Account credentials and metadata.
    pub account: AccountConfig,
    /// Rate-limited request executor for this account.
    pub executor: Arc<RequestExecutor>,
    /// Half-open UTC time range to fetch.
    pub range: TimeRange,
    /// Symbols to keep; `None` keeps everything. Applied after
    /// normalization, against unified symbol names.
    pub symbols: Option<Vec<String>>,
    /// Overlap between consecutive planner windows, for venues fetched with
    /// the time-window strategy.
    pub window_overlap: TimeDelta,
}

impl FetchContext {
    /// Whether a normalized symbol passes the plan's symbol filter.
    #[must_use]
    pub fn symbol_matches(&self, symbol: &str) -> bool {
        self.symbols
            .as_ref()
            .is_none_or(|symbols| symbols.iter().any(|s| s == symbol))
    }
}

/// One exchange's wiring: endpoints, signing, pagination shape, and field
/// normalization.
///
/// Adapters are stateless; per-account state (HTTP client, rate limiter)
/// lives in the [`FetchContext`]. All methods return lazily — building a
/// stream performs no I/O.
pub trait ExchangeAdapter: Send + Sync {
    /// Stable identifier, as used in config sections and output paths.
    fn id(&self) -> &'static str;

    /// Response-header profile carrying this venue's rate-limit metadata.
    fn rate_limit_headers(&self) -> RateLimitHeaders {
        RateLimitHeaders::default()
    }

    /// Account trade fills in the range.
    fn trades(&self, ctx: &FetchContext) -> RecordStream;

    /// Funding-fee settlements in the range.
    fn funding(&self, ctx: &FetchContext) -> RecordStream;

    /// Deposits in the range.
    fn deposits(&self, ctx: &FetchContext) -> RecordStream;

    /// Withdrawals in the range.
    fn withdrawals(&self, ctx: &FetchContext) -> RecordStream;

    /// Fee-type records beyond trading and funding fees (interest,
    /// liquidations, rebates). Venues without a source yield nothing.
    fn fees(&self, _ctx: &FetchContext) -> RecordStream {
        stream::empty().boxed()
    }

    /// Dispatches to the method for one record kind.
    fn fetch(&self, kind: RecordKind, ctx: &FetchContext) -> RecordStream {
        match kind {
            RecordKind::Trades => self.trades(ctx),
            RecordKind::Funding => self.funding(ctx),
            RecordKind::Deposits => self.deposits(ctx),
            RecordKind::Withdrawals => self.withdrawals(ctx),
            RecordKind::Fees => self.fees(ctx),
        }
    }
}

/// A stream that yields a single error, for failures detected while the
/// stream is being built.
pub(crate) fn error_stream(error: ExchangeError) -> RecordStream {
    stream::once(futures::future::ready(Err(error))).boxed()
}

/// Applies the per-item skip policy: a malformed item is logged once and
/// dropped, and the page continues.
pub(crate) fn finish_record(
    exchange: &'static str,
    normalized: Result<Record, NormalizeError>,
    what: &'static str,
) -> Option<Result<Record, ExchangeError>> {
    match normalized {
        Ok(record) => Some(Ok(record)),
        Err(err) => {
            warn!(exchange, item = what, error = %err, "skipping malformed item");
            None
        }
    }
}

/// Like [`finish_record`], plus the post-normalization symbol filter for
/// symbol-scoped record kinds.
pub(crate) fn finish_symbol_record(
    ctx: &FetchContext,
    exchange: &'static str,
    normalized: Result<Record, NormalizeError>,
    what: &'static str,
) -> Option<Result<Record, ExchangeError>> {
    match finish_record(exchange, normalized, what)? {
        Ok(record) => {
            let symbol = match &record {
                Record::Trade(trade) => trade.symbol.as_str(),
                Record::Funding(funding) => funding.symbol.as_str(),
                _ => return Some(Ok(record)),
            };
            ctx.symbol_matches(symbol).then_some(Ok(record))
        }
        Err(err) => Some(Err(err)),
    }
}

/// Global adapter registry instance.
static REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();

/// Registry of exchange adapters, keyed by exchange id.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ExchangeAdapter>>,
}

impl AdapterRegistry {
    /// Returns the global registry with the built-in adapters.
    ///
    /// The registry is initialized lazily on first access.
    #[must_use]
    pub fn global() -> &'static Self {
        REGISTRY.get_or_init(|| {
            let adapters: Vec<Box<dyn ExchangeAdapter>> =
                vec![Box::new(BinancePmAdapter), Box::new(OkxAdapter)];
            Self::new(adapters)
        })
    }

    /// Creates a registry from an explicit adapter set.
    #[must_use]
    pub fn new(adapters: Vec<Box<dyn ExchangeAdapter>>) -> Self {
        Self { adapters }
    }

    /// Looks up an adapter by exchange id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn ExchangeAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.id() == id)
            .map(Box::as_ref)
    }

    /// Iterates over registered exchange ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.iter().map(|adapter| adapter.id())
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.ids().collect::<Vec<_>>())
            .finish()
    }
}
