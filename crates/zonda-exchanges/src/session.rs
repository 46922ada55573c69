//! Session orchestration.
//!
//! A [`FetchPlan`] names the exchanges, accounts, record kinds, and time
//! range to pull. [`run_session`] expands it into units of work (one per
//! exchange/account/kind), runs accounts concurrently and the kinds within
//! an account sequentially, and hands each unit's record stream to a
//! caller-supplied consumer. Failures are caught at the unit boundary so a
//! broken endpoint or account never aborts its siblings; the outcome of
//! every unit comes back in the report list.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::TimeDelta;
use futures::StreamExt;
use futures::stream;
use tracing::{info, warn};
use zonda_config::{AccountConfig, Config, ExchangeConfig, GlobalConfig};
use zonda_fetch::{ExecutorConfig, RateLimitHeaders, RateLimiter, RequestExecutor};
use zonda_types::{RecordKind, TimeRange};

use crate::adapter::{AdapterRegistry, ExchangeAdapter, FetchContext, RecordStream};
use crate::error::ExchangeError;

/// What to fetch in one session.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    /// Exchange ids to pull. Empty means every enabled configured exchange.
    pub exchanges: Vec<String>,
    /// Account names to include, `None` for all configured accounts.
    pub accounts: Option<Vec<String>>,
    /// Record kinds to fetch for each account.
    pub kinds: Vec<RecordKind>,
    /// Time range to cover.
    pub range: TimeRange,
    /// Symbols to keep, `None` for all. Applies to trades and funding.
    pub symbols: Option<Vec<String>>,
    /// Overlap between adjacent fetch windows on windowed endpoints.
    pub window_overlap: TimeDelta,
    /// How many accounts to fetch concurrently.
    pub concurrency: usize,
}

impl FetchPlan {
    /// Creates a plan covering every enabled exchange, every account, and
    /// every record kind over the given range.
    #[must_use]
    pub fn new(range: TimeRange) -> Self {
        Self {
            exchanges: Vec::new(),
            accounts: None,
            kinds: RecordKind::all().to_vec(),
            range,
            symbols: None,
            window_overlap: TimeDelta::zero(),
            concurrency: 4,
        }
    }
}

/// One unit of session work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUnit {
    /// Exchange id.
    pub exchange: String,
    /// Account name.
    pub account: String,
    /// Record kind.
    pub kind: RecordKind,
}

impl fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.exchange, self.account, self.kind)
    }
}

/// How a unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The unit's stream was consumed to the end.
    Completed {
        /// Records the consumer accepted.
        records: u64,
    },
    /// The unit failed; siblings kept running.
    Failed {
        /// Rendered error.
        error: String,
    },
}

/// Outcome of one unit, reported after the session finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// The unit this report covers.
    pub unit: FetchUnit,
    /// How it ended.
    pub outcome: UnitOutcome,
}

impl UnitReport {
    /// Whether the unit completed.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Completed { .. })
    }
}

struct AccountWork<'a> {
    adapter: &'a dyn ExchangeAdapter,
    exchange: String,
    account: AccountConfig,
    max_weight: u32,
}

/// Runs a fetch session, handing each unit's record stream to `consume`.
///
/// `consume` receives the unit and its stream and returns how many records
/// it accepted; an error from the consumer fails that unit only. Accounts
/// run concurrently up to the plan's concurrency; the kinds within one
/// account share a single rate-limited HTTP executor and run one after
/// another.
///
/// # Errors
///
/// Fails before any unit runs when the plan names an exchange with no
/// adapter or no configuration. Disabled exchanges and accounts excluded
/// by the plan's filter are skipped with a warning instead.
pub async fn run_session<F, Fut, E>(
    registry: &AdapterRegistry,
    config: &Config,
    plan: &FetchPlan,
    consume: F,
) -> Result<Vec<UnitReport>, ExchangeError>
where
    F: Fn(FetchUnit, RecordStream) -> Fut,
    Fut: Future<Output = Result<u64, E>>,
    E: fmt::Display,
{
    let work = plan_work(registry, config, plan)?;
    info!(
        accounts = work.len(),
        kinds = plan.kinds.len(),
        range = %plan.range,
        "starting fetch session"
    );

    let global = &config.global;
    let consume = &consume;
    let reports: Vec<Vec<UnitReport>> = stream::iter(work)
        .map(|work| run_account(work, plan, global, consume))
        .buffer_unordered(plan.concurrency.max(1))
        .collect()
        .await;
    Ok(reports.into_iter().flatten().collect())
}

fn plan_work<'a>(
    registry: &'a AdapterRegistry,
    config: &'a Config,
    plan: &FetchPlan,
) -> Result<Vec<AccountWork<'a>>, ExchangeError> {
    let mut selected: Vec<(String, &dyn ExchangeAdapter, &ExchangeConfig)> = Vec::new();
    if plan.exchanges.is_empty() {
        for (name, exchange) in config.enabled_exchanges() {
            match registry.get(name) {
                Some(adapter) => selected.push((name.to_string(), adapter, exchange)),
                None => warn!(exchange = name, "no adapter for configured exchange, skipping"),
            }
        }
    } else {
        for name in &plan.exchanges {
            let adapter = registry
                .get(name)
                .ok_or_else(|| ExchangeError::UnknownExchange(name.clone()))?;
            let exchange = config
                .exchange(name)
                .ok_or_else(|| ExchangeError::NotConfigured(name.clone()))?;
            if !exchange.enabled {
                warn!(exchange = %name, "exchange disabled in config, skipping");
                continue;
            }
            selected.push((name.clone(), adapter, exchange));
        }
    }

    let mut work = Vec::new();
    for (exchange_name, adapter, exchange) in selected {
        let mut matched = 0usize;
        for account in &exchange.accounts {
            if plan
                .accounts
                .as_ref()
                .is_some_and(|filter| !filter.iter().any(|name| name == &account.name))
            {
                continue;
            }
            matched += 1;
            work.push(AccountWork {
                adapter,
                exchange: exchange_name.clone(),
                account: account.clone(),
                max_weight: exchange.rate_limit.max_weight_per_minute,
            });
        }
        if matched == 0 {
            warn!(exchange = %exchange_name, "no matching accounts, skipping");
        }
    }
    Ok(work)
}

async fn run_account<F, Fut, E>(
    work: AccountWork<'_>,
    plan: &FetchPlan,
    global: &GlobalConfig,
    consume: &F,
) -> Vec<UnitReport>
where
    F: Fn(FetchUnit, RecordStream) -> Fut,
    Fut: Future<Output = Result<u64, E>>,
    E: fmt::Display,
{
    let unit_for = |kind: RecordKind| FetchUnit {
        exchange: work.exchange.clone(),
        account: work.account.name.clone(),
        kind,
    };

    let headers = work.adapter.rate_limit_headers();
    let executor = match build_executor(global, work.max_weight, headers) {
        Ok(executor) => Arc::new(executor),
        Err(err) => {
            // No client means no kind of this account can run.
            warn!(
                exchange = %work.exchange,
                account = %work.account.name,
                error = %err,
                "cannot build HTTP client"
            );
            return plan
                .kinds
                .iter()
                .map(|&kind| UnitReport {
                    unit: unit_for(kind),
                    outcome: UnitOutcome::Failed {
                        error: err.to_string(),
                    },
                })
                .collect();
        }
    };

    let mut reports = Vec::with_capacity(plan.kinds.len());
    for &kind in &plan.kinds {
        let unit = unit_for(kind);
        let ctx = FetchContext {
            account: work.account.clone(),
            executor: Arc::clone(&executor),
            range: plan.range,
            symbols: plan.symbols.clone(),
            window_overlap: plan.window_overlap,
        };
        let stream = work.adapter.fetch(kind, &ctx);
        let outcome = match consume(unit.clone(), stream).await {
            Ok(records) => {
                info!(unit = %unit, records, "unit finished");
                UnitOutcome::Completed { records }
            }
            Err(err) => {
                warn!(unit = %unit, error = %err, "unit failed");
                UnitOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        reports.push(UnitReport { unit, outcome });
    }
    reports
}

fn build_executor(
    global: &GlobalConfig,
    max_weight: u32,
    headers: RateLimitHeaders,
) -> Result<RequestExecutor, reqwest::Error> {
    let config = ExecutorConfig {
        max_retries: global.retry_times,
        timeout: global.timeout(),
        proxy: global.proxy.clone(),
        ..ExecutorConfig::default()
    };
    RequestExecutor::new(config, RateLimiter::new(max_weight), headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::error_stream;
    use futures::TryStreamExt;
    use futures::future;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use zonda_types::{
        EventTime, Record, RecordMeta, TransferDirection, TransferRecord, TransferStatus,
        from_timestamp_ms,
    };

    #[derive(Debug)]
    struct FakeAdapter;

    fn deposit_record() -> Record {
        Record::Transfer(TransferRecord {
            meta: RecordMeta::new("fake", "main"),
            direction: TransferDirection::Deposit,
            currency: "USDT".to_string(),
            amount: Decimal::from(100),
            network: None,
            address: None,
            tx_hash: None,
            status: TransferStatus::Success,
            time: EventTime::from_ms(1_640_995_200_000).unwrap(),
            fee: None,
            fee_currency: None,
            internal_transfer: false,
            tag: None,
            memo: None,
            raw: Value::Null,
        })
    }

    impl ExchangeAdapter for FakeAdapter {
        fn id(&self) -> &'static str {
            "fake"
        }

        fn trades(&self, _ctx: &FetchContext) -> RecordStream {
            error_stream(ExchangeError::Response("endpoint down".to_string()))
        }

        fn funding(&self, _ctx: &FetchContext) -> RecordStream {
            stream::empty().boxed()
        }

        fn deposits(&self, _ctx: &FetchContext) -> RecordStream {
            stream::once(future::ready(Ok(deposit_record()))).boxed()
        }

        fn withdrawals(&self, _ctx: &FetchContext) -> RecordStream {
            stream::empty().boxed()
        }
    }

    fn registry() -> AdapterRegistry {
        let adapters: Vec<Box<dyn ExchangeAdapter>> = vec![Box::new(FakeAdapter)];
        AdapterRegistry::new(adapters)
    }

    fn config() -> Config {
        Config::from_yaml(
            r"
exchanges:
  fake:
    accounts:
      - name: main
        api_key: k1
        api_secret: s1
        account_type: portfolio_margin
      - name: alt
        api_key: k2
        api_secret: s2
        account_type: portfolio_margin
",
        )
        .unwrap()
    }

    fn range() -> TimeRange {
        TimeRange::new(
            from_timestamp_ms(1_640_995_200_000).unwrap(),
            from_timestamp_ms(1_641_081_600_000).unwrap(),
        )
        .unwrap()
    }

    async fn count_records(
        _unit: FetchUnit,
        stream: RecordStream,
    ) -> Result<u64, ExchangeError> {
        stream
            .try_fold(0u64, |count, _| future::ready(Ok(count + 1)))
            .await
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_abort_siblings() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["fake".to_string()];
        plan.kinds = vec![RecordKind::Trades, RecordKind::Deposits, RecordKind::Funding];

        let reports = run_session(&registry(), &config(), &plan, count_records)
            .await
            .unwrap();
        assert_eq!(reports.len(), 6);

        let find = |account: &str, kind: RecordKind| {
            reports
                .iter()
                .find(|r| r.unit.account == account && r.unit.kind == kind)
                .unwrap()
        };
        for account in ["main", "alt"] {
            let trades = find(account, RecordKind::Trades);
            assert!(!trades.is_ok());
            assert!(matches!(
                &trades.outcome,
                UnitOutcome::Failed { error } if error.contains("endpoint down")
            ));
            assert_eq!(
                find(account, RecordKind::Deposits).outcome,
                UnitOutcome::Completed { records: 1 }
            );
            assert_eq!(
                find(account, RecordKind::Funding).outcome,
                UnitOutcome::Completed { records: 0 }
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_exchange_is_an_error() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["mt_gox".to_string()];

        let err = run_session(&registry(), &config(), &plan, count_records)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownExchange(name) if name == "mt_gox"));
    }

    #[tokio::test]
    async fn test_unconfigured_exchange_is_an_error() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["fake".to_string()];
        let empty = Config::from_yaml("exchanges: {}").unwrap();

        let err = run_session(&registry(), &empty, &plan, count_records)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotConfigured(name) if name == "fake"));
    }

    #[tokio::test]
    async fn test_disabled_exchange_is_skipped() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["fake".to_string()];
        let disabled = Config::from_yaml(
            r"
exchanges:
  fake:
    enabled: false
    accounts:
      - name: main
        api_key: k
        api_secret: s
        account_type: portfolio_margin
",
        )
        .unwrap();

        let reports = run_session(&registry(), &disabled, &plan, count_records)
            .await
            .unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_account_filter() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["fake".to_string()];
        plan.accounts = Some(vec!["alt".to_string()]);
        plan.kinds = vec![RecordKind::Deposits];

        let reports = run_session(&registry(), &config(), &plan, count_records)
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].unit.account, "alt");
    }

    #[tokio::test]
    async fn test_empty_exchange_list_covers_enabled_exchanges() {
        let mut plan = FetchPlan::new(range());
        plan.kinds = vec![RecordKind::Deposits];

        let reports = run_session(&registry(), &config(), &plan, count_records)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.unit.exchange == "fake"));
    }

    #[tokio::test]
    async fn test_consumer_error_fails_the_unit() {
        let mut plan = FetchPlan::new(range());
        plan.exchanges = vec!["fake".to_string()];
        plan.accounts = Some(vec!["main".to_string()]);
        plan.kinds = vec![RecordKind::Deposits, RecordKind::Funding];

        let reports = run_session(&registry(), &config(), &plan, |unit, stream| async move {
            if unit.kind == RecordKind::Deposits {
                return Err("disk full".to_string());
            }
            count_records(unit, stream).await.map_err(|e| e.to_string())
        })
        .await
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].outcome,
            UnitOutcome::Failed {
                error: "disk full".to_string()
            }
        );
        assert!(reports[1].is_ok());
    }

    #[test]
    fn test_unit_display() {
        let unit = FetchUnit {
            exchange: "fake".to_string(),
            account: "main".to_string(),
            kind: RecordKind::Trades,
        };
        assert_eq!(unit.to_string(), "fake/main/trades");
    }
}
