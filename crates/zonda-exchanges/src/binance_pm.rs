//! Binance Portfolio Margin adapter.
//!
//! Trades and funding settlements come from the PAPI
//! (`papi.binance.com`), which caps each query at 24 hours — they are
//! fetched with the time-window strategy, overlap handled by the dedup
//! layer. Deposits and withdrawals come from the spot SAPI
//! (`api.binance.com`), paginated by page number via the cursor strategy.
//! Every request is signed with HMAC-SHA256 over the exact encoded query.

use chrono::{TimeDelta, Utc};
use futures::StreamExt;
use futures::future;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use zonda_fetch::{Page, RateLimitHeaders, item_key, paginate_cursor, paginate_windows};
use zonda_types::{
    FundingRecord, Liquidity, OrderType, PositionSide, Record, RecordMeta, TradeRecord, TradeSide,
    TransferDirection, TransferRecord, TransferStatus, Window,
};

use crate::adapter::{
    ExchangeAdapter, FetchContext, RecordStream, error_stream, finish_record, finish_symbol_record,
};
use crate::error::ExchangeError;
use crate::normalize::{
    NormalizeError, decimal_field, event_time_ms, ms_field, ms_field_with_format,
    opt_decimal_field, opt_str_field, str_field, string_field, take_array,
};
use crate::sign::{encode_query, hmac_sha256_hex};

const EXCHANGE_ID: &str = "binance_pm";

const PAPI_BASE: &str = "https://papi.binance.com";
const SAPI_BASE: &str = "https://api.binance.com";

const PM_TRADES_PATH: &str = "/papi/v1/pm/trade";
const PM_FUNDING_PATH: &str = "/papi/v1/pm/funding";
const DEPOSITS_PATH: &str = "/sapi/v1/capital/deposit/hisrec";
const WITHDRAWALS_PATH: &str = "/sapi/v1/capital/withdraw/history";

/// Items per page; a short page means the last one.
const PAGE_LIMIT: usize = 100;

/// Withdrawal `applyTime` comes back as a datetime string, not epoch ms.
const APPLY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// PAPI rejects ranges wider than this per query.
fn max_query_window() -> TimeDelta {
    TimeDelta::hours(24)
}

/// Binance Portfolio Margin.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinancePmAdapter;

impl ExchangeAdapter for BinancePmAdapter {
    fn id(&self) -> &'static str {
        EXCHANGE_ID
    }

    fn rate_limit_headers(&self) -> RateLimitHeaders {
        RateLimitHeaders {
            used_weight: vec![
                "X-MBX-USED-WEIGHT-1M".to_string(),
                "X-SAPI-USED-IP-WEIGHT-1M".to_string(),
            ],
            remaining: Some("X-RateLimit-Remaining".to_string()),
            reset_after: Some("X-RateLimit-Reset".to_string()),
        }
    }

    fn trades(&self, ctx: &FetchContext) -> RecordStream {
        windowed_stream(ctx, PM_TRADES_PATH, |ctx, raw| {
            let normalized = normalize_trade(&ctx.account.name, raw).map(Record::Trade);
            finish_symbol_record(ctx, EXCHANGE_ID, normalized, "trade")
        })
    }

    fn funding(&self, ctx: &FetchContext) -> RecordStream {
        windowed_stream(ctx, PM_FUNDING_PATH, |ctx, raw| {
            let normalized = normalize_funding(&ctx.account.name, raw).map(Record::Funding);
            finish_symbol_record(ctx, EXCHANGE_ID, normalized, "funding")
        })
    }

    fn deposits(&self, ctx: &FetchContext) -> RecordStream {
        transfer_stream(ctx, DEPOSITS_PATH, TransferDirection::Deposit)
    }

    fn withdrawals(&self, ctx: &FetchContext) -> RecordStream {
        transfer_stream(ctx, WITHDRAWALS_PATH, TransferDirection::Withdrawal)
    }
}

/// Builds the windowed PAPI stream shared by trades and funding.
fn windowed_stream<F>(ctx: &FetchContext, path: &'static str, finish: F) -> RecordStream
where
    F: Fn(&FetchContext, Value) -> Option<Result<Record, ExchangeError>> + Send + 'static,
{
    let windows = match ctx
        .range
        .windows_with_overlap(max_query_window(), ctx.window_overlap)
    {
        Ok(windows) => windows,
        Err(err) => return error_stream(err.into()),
    };
    let fetch_ctx = ctx.clone();
    let fetch = move |window: Window| window_pages(fetch_ctx.clone(), path, window);
    let filter_ctx = ctx.clone();
    paginate_windows(windows, fetch, item_key)
        .filter_map(move |result| {
            future::ready(match result {
                Ok(raw) => finish(&filter_ctx, raw),
                Err(err) => Some(Err(err)),
            })
        })
        .boxed()
}

/// Builds the SAPI transfer stream shared by deposits and withdrawals.
fn transfer_stream(
    ctx: &FetchContext,
    path: &'static str,
    direction: TransferDirection,
) -> RecordStream {
    let fetch_ctx = ctx.clone();
    let fetch = move |cursor: Option<String>| transfer_page(fetch_ctx.clone(), path, cursor);
    let account_name = ctx.account.name.clone();
    paginate_cursor(fetch)
        .filter_map(move |result| {
            future::ready(match result {
                Ok(raw) => {
                    let normalized = match direction {
                        TransferDirection::Deposit => normalize_deposit(&account_name, raw),
                        TransferDirection::Withdrawal => normalize_withdrawal(&account_name, raw),
                    };
                    finish_record(EXCHANGE_ID, normalized.map(Record::Transfer), "transfer")
                }
                Err(err) => Some(Err(err)),
            })
        })
        .boxed()
}

/// Fetches every page of one PAPI window.
///
/// The PAPI wraps items in a `data` array and pages by number; a missing or
/// short page ends the window.
async fn window_pages(
    ctx: FetchContext,
    path: &'static str,
    window: Window,
) -> Result<Vec<Value>, ExchangeError> {
    let mut items = Vec::new();
    let mut page: u32 = 1;
    loop {
        let params = vec![
            ("startTime".to_string(), window.start_ms().to_string()),
            ("endTime".to_string(), window.end_ms().to_string()),
            ("page".to_string(), page.to_string()),
            ("limit".to_string(), PAGE_LIMIT.to_string()),
        ];
        let body = signed_get(&ctx, PAPI_BASE, path, params).await?;
        let data = take_array(body, "data");
        if data.is_empty() {
            break;
        }
        let fetched = data.len();
        items.extend(data);
        if fetched < PAGE_LIMIT {
            break;
        }
        page += 1;
    }
    Ok(items)
}

/// Fetches one SAPI page. The page number rides in the cursor token; a
/// short page ends the pagination.
async fn transfer_page(
    ctx: FetchContext,
    path: &'static str,
    cursor: Option<String>,
) -> Result<Page<Value>, ExchangeError> {
    let page: u32 = match cursor {
        None => 1,
        Some(token) => token
            .parse()
            .map_err(|_| ExchangeError::Response(format!("unexpected page token `{token}`")))?,
    };
    let params = vec![
        ("startTime".to_string(), ctx.range.start_ms().to_string()),
        ("endTime".to_string(), ctx.range.end_ms().to_string()),
        ("page".to_string(), page.to_string()),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    let body = signed_get(&ctx, SAPI_BASE, path, params).await?;
    let Value::Array(items) = body else {
        return Err(ExchangeError::Response(
            "expected a top-level JSON array".to_string(),
        ));
    };
    let has_more = items.len() == PAGE_LIMIT;
    let next_cursor = has_more.then(|| (page + 1).to_string());
    Ok(Page::new(items, has_more, next_cursor))
}

/// Signs and sends one GET request.
///
/// Binance signs the encoded query string (with `timestamp` appended) and
/// expects the hex digest as a final `signature` parameter; the API key
/// rides in the `X-MBX-APIKEY` header.
async fn signed_get(
    ctx: &FetchContext,
    base: &str,
    path: &str,
    mut params: Vec<(String, String)>,
) -> Result<Value, ExchangeError> {
    params.push((
        "timestamp".to_string(),
        Utc::now().timestamp_millis().to_string(),
    ));
    let signature = hmac_sha256_hex(&ctx.account.api_secret, &encode_query(&params));
    params.push(("signature".to_string(), signature));

    let mut api_key =
        HeaderValue::from_str(&ctx.account.api_key).map_err(|_| ExchangeError::InvalidCredential {
            account: ctx.account.name.clone(),
        })?;
    api_key.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert("X-MBX-APIKEY", api_key);

    let url = format!("{base}{path}");
    Ok(ctx.executor.get(&url, &params, &headers).await?)
}

fn normalize_trade(account_name: &str, raw: Value) -> Result<TradeRecord, NormalizeError> {
    let price = decimal_field(&raw, "price")?;
    let amount = decimal_field(&raw, "qty")?;
    let time = event_time_ms(ms_field(&raw, "time")?, "time")?;
    Ok(TradeRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        symbol: str_field(&raw, "symbol")?.to_string(),
        side: TradeSide::from_exchange(str_field(&raw, "side")?),
        // PM trade items carry no order type.
        order_type: raw
            .get("type")
            .and_then(Value::as_str)
            .map_or(OrderType::Unknown, OrderType::from_exchange),
        price,
        amount,
        cost: price * amount,
        fee: decimal_field(&raw, "commission")?,
        fee_currency: str_field(&raw, "commissionAsset")?.to_string(),
        trade_id: string_field(&raw, "id")?,
        order_id: string_field(&raw, "orderId")?,
        time,
        position_side: raw
            .get("positionSide")
            .and_then(Value::as_str)
            .and_then(PositionSide::from_exchange),
        liquidity: raw
            .get("maker")
            .and_then(Value::as_bool)
            .map(|maker| if maker { Liquidity::Maker } else { Liquidity::Taker }),
        fee_rate: None,
        realized_pnl: opt_decimal_field(&raw, "realizedPnl")?,
        raw,
    })
}

fn normalize_funding(account_name: &str, raw: Value) -> Result<FundingRecord, NormalizeError> {
    let time = event_time_ms(ms_field(&raw, "time")?, "time")?;
    Ok(FundingRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        symbol: str_field(&raw, "symbol")?.to_string(),
        funding_rate: opt_decimal_field(&raw, "fundingRate")?,
        funding_fee: decimal_field(&raw, "fee")?,
        position_size: opt_decimal_field(&raw, "positionSize")?,
        time,
        settlement_period: None,
        funding_index: None,
        cycle: None,
        raw,
    })
}

fn normalize_deposit(account_name: &str, raw: Value) -> Result<TransferRecord, NormalizeError> {
    let time = event_time_ms(ms_field(&raw, "insertTime")?, "insertTime")?;
    Ok(TransferRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        direction: TransferDirection::Deposit,
        currency: str_field(&raw, "coin")?.to_string(),
        amount: decimal_field(&raw, "amount")?,
        network: opt_str_field(&raw, "network").map(ToString::to_string),
        address: opt_str_field(&raw, "address").map(ToString::to_string),
        tx_hash: opt_str_field(&raw, "txId").map(ToString::to_string),
        status: deposit_status(raw.get("status").and_then(Value::as_i64)),
        time,
        fee: None,
        fee_currency: None,
        internal_transfer: is_internal(&raw),
        tag: None,
        memo: None,
        raw,
    })
}

fn normalize_withdrawal(account_name: &str, raw: Value) -> Result<TransferRecord, NormalizeError> {
    let ms = ms_field_with_format(&raw, "applyTime", APPLY_TIME_FORMAT)?;
    let time = event_time_ms(ms, "applyTime")?;
    let currency = str_field(&raw, "coin")?.to_string();
    Ok(TransferRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        direction: TransferDirection::Withdrawal,
        currency: currency.clone(),
        amount: decimal_field(&raw, "amount")?,
        network: opt_str_field(&raw, "network").map(ToString::to_string),
        address: opt_str_field(&raw, "address").map(ToString::to_string),
        tx_hash: opt_str_field(&raw, "txId").map(ToString::to_string),
        status: withdrawal_status(raw.get("status").and_then(Value::as_i64)),
        time,
        fee: opt_decimal_field(&raw, "transactionFee")?,
        // The withdrawal fee is charged in the withdrawn coin.
        fee_currency: Some(currency),
        internal_transfer: is_internal(&raw),
        tag: None,
        memo: None,
        raw,
    })
}

/// Deposit status codes: 0 pending, 1 success, 6 failed.
const fn deposit_status(code: Option<i64>) -> TransferStatus {
    match code {
        Some(0) => TransferStatus::Pending,
        Some(1) => TransferStatus::Success,
        Some(6) => TransferStatus::Failed,
        _ => TransferStatus::Unknown,
    }
}

/// Withdrawal status codes: 0..=5 are in-flight states (email sent,
/// awaiting approval, processing, ...), 6 is completed.
const fn withdrawal_status(code: Option<i64>) -> TransferStatus {
    match code {
        Some(0..=5) => TransferStatus::Pending,
        Some(6) => TransferStatus::Success,
        _ => TransferStatus::Unknown,
    }
}

/// `transferType` 1 marks an internal (off-chain) transfer.
fn is_internal(raw: &Value) -> bool {
    raw.get("transferType").and_then(Value::as_i64) == Some(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_normalize_trade() {
        let raw = json!({
            "symbol": "BTCUSDT",
            "id": 4_389_055_565_i64,
            "orderId": 90_271_353_923_i64,
            "side": "BUY",
            "price": "43000.10",
            "qty": "0.002",
            "commission": "0.03440008",
            "commissionAsset": "USDT",
            "time": 1_640_995_200_000_i64,
            "maker": false,
            "positionSide": "BOTH",
            "realizedPnl": "0"
        });
        let trade = normalize_trade("main", raw).unwrap();

        assert_eq!(trade.meta.exchange, "binance_pm");
        assert_eq!(trade.meta.account_name, "main");
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.order_type, OrderType::Unknown);
        assert_eq!(trade.price, Decimal::from_str("43000.10").unwrap());
        assert_eq!(trade.amount, Decimal::from_str("0.002").unwrap());
        // Exact decimal product, not a float round trip.
        assert_eq!(trade.cost, Decimal::from_str("86.0002").unwrap());
        assert_eq!(trade.fee, Decimal::from_str("0.03440008").unwrap());
        assert_eq!(trade.fee_currency, "USDT");
        assert_eq!(trade.trade_id, "4389055565");
        assert_eq!(trade.order_id, "90271353923");
        assert_eq!(trade.time.timestamp(), 1_640_995_200_000);
        assert_eq!(trade.time.datetime(), "2022-01-01T00:00:00.000Z");
        assert_eq!(trade.position_side, Some(PositionSide::Dual));
        assert_eq!(trade.liquidity, Some(Liquidity::Taker));
    }

    #[test]
    fn test_normalize_trade_missing_price_is_an_error() {
        let raw = json!({
            "symbol": "BTCUSDT",
            "side": "SELL",
            "qty": "1",
            "time": 1_640_995_200_000_i64
        });
        assert!(matches!(
            normalize_trade("main", raw),
            Err(NormalizeError::Missing("price"))
        ));
    }

    #[test]
    fn test_normalize_funding() {
        let raw = json!({
            "symbol": "ETHUSDT",
            "fundingRate": "-0.00012500",
            "fee": "-0.521",
            "positionSize": "12.5",
            "time": 1_641_024_000_000_i64
        });
        let funding = normalize_funding("main", raw).unwrap();

        assert_eq!(funding.symbol, "ETHUSDT");
        assert_eq!(
            funding.funding_rate,
            Some(Decimal::from_str("-0.000125").unwrap())
        );
        assert_eq!(funding.funding_fee, Decimal::from_str("-0.521").unwrap());
        assert_eq!(funding.position_size, Some(Decimal::from_str("12.5").unwrap()));
        assert_eq!(funding.time.datetime(), "2022-01-01T08:00:00.000Z");
    }

    #[test]
    fn test_normalize_funding_without_rate() {
        let raw = json!({
            "symbol": "ETHUSDT",
            "fundingRate": "",
            "fee": "0.1",
            "time": 1_641_024_000_000_i64
        });
        let funding = normalize_funding("main", raw).unwrap();
        assert_eq!(funding.funding_rate, None);
        assert_eq!(funding.position_size, None);
    }

    #[test]
    fn test_normalize_deposit_statuses() {
        for (code, expected) in [
            (0, TransferStatus::Pending),
            (1, TransferStatus::Success),
            (6, TransferStatus::Failed),
            (9, TransferStatus::Unknown),
        ] {
            let raw = json!({
                "coin": "USDT",
                "amount": "1500",
                "network": "TRX",
                "address": "TXyz",
                "txId": "deadbeef",
                "status": code,
                "insertTime": 1_640_995_200_000_i64
            });
            let deposit = normalize_deposit("main", raw).unwrap();
            assert_eq!(deposit.status, expected, "status code {code}");
            assert_eq!(deposit.direction, TransferDirection::Deposit);
        }
    }

    #[test]
    fn test_normalize_withdrawal_apply_time_string() {
        let raw = json!({
            "coin": "BTC",
            "amount": "0.25",
            "address": "bc1qxyz",
            "txId": "cafef00d",
            "status": 6,
            "applyTime": "2022-01-01 00:00:00",
            "transactionFee": "0.0005",
            "transferType": 0
        });
        let withdrawal = normalize_withdrawal("main", raw).unwrap();

        assert_eq!(withdrawal.direction, TransferDirection::Withdrawal);
        assert_eq!(withdrawal.status, TransferStatus::Success);
        assert_eq!(withdrawal.time.timestamp(), 1_640_995_200_000);
        assert_eq!(withdrawal.time.datetime(), "2022-01-01T00:00:00.000Z");
        assert_eq!(withdrawal.fee, Some(Decimal::from_str("0.0005").unwrap()));
        assert_eq!(withdrawal.fee_currency.as_deref(), Some("BTC"));
        assert!(!withdrawal.internal_transfer);
    }

    #[test]
    fn test_normalize_withdrawal_in_flight_statuses_map_to_pending() {
        for code in 0..=5 {
            let raw = json!({
                "coin": "BTC",
                "amount": "1",
                "status": code,
                "applyTime": "2022-01-01 00:00:00"
            });
            let withdrawal = normalize_withdrawal("main", raw).unwrap();
            assert_eq!(withdrawal.status, TransferStatus::Pending, "status code {code}");
        }
    }

    #[test]
    fn test_internal_transfer_flag() {
        let raw = json!({
            "coin": "USDT",
            "amount": "100",
            "status": 1,
            "insertTime": 1_640_995_200_000_i64,
            "transferType": 1
        });
        assert!(normalize_deposit("main", raw).unwrap().internal_transfer);
    }
}
