//! OKX v5 adapter.
//!
//! Everything paginates with the last-id strategy. Trade fills and
//! funding-fee bills pivot on `billId` and take `begin`/`end` range
//! parameters; the asset endpoints (deposit/withdrawal history) have no
//! range parameters and paginate backwards by timestamp, so the adapter
//! seeds `after` with the range end, trims items below the range start,
//! and lets the pagination stall out once a page retains nothing.
//!
//! Requests are signed with HMAC-SHA256 over
//! `timestamp + method + path?query`, base64-encoded, with the key,
//! signature, timestamp, and passphrase in `OK-ACCESS-*` headers.

use chrono::Utc;
use futures::StreamExt;
use futures::future;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use zonda_fetch::{Page, RateLimitHeaders, key_field, paginate_last_id};
use zonda_types::{
    FundingRecord, Liquidity, OrderType, PositionSide, Record, RecordMeta, TradeRecord, TradeSide,
    TransferDirection, TransferRecord, TransferStatus, format_iso8601,
};

use crate::adapter::{
    ExchangeAdapter, FetchContext, RecordStream, finish_record, finish_symbol_record,
};
use crate::error::ExchangeError;
use crate::normalize::{
    NormalizeError, decimal_field, event_time_ms, ms_field, opt_decimal_field, opt_str_field,
    str_field, string_field, take_array,
};
use crate::sign::{encode_query, hmac_sha256_base64};

const EXCHANGE_ID: &str = "okx";

const BASE: &str = "https://www.okx.com";

const FILLS_PATH: &str = "/api/v5/trade/fills-history";
const BILLS_PATH: &str = "/api/v5/account/bills-archive";
const DEPOSITS_PATH: &str = "/api/v5/asset/deposit-history";
const WITHDRAWALS_PATH: &str = "/api/v5/asset/withdrawal-history";

/// Items per page; a short page means the last one.
const PAGE_LIMIT: usize = 100;

/// Bill type for funding-fee settlements.
const FUNDING_BILL_TYPE: &str = "8";

/// OKX v5.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkxAdapter;

impl ExchangeAdapter for OkxAdapter {
    fn id(&self) -> &'static str {
        EXCHANGE_ID
    }

    fn rate_limit_headers(&self) -> RateLimitHeaders {
        RateLimitHeaders {
            used_weight: Vec::new(),
            remaining: Some("X-RateLimit-Remaining".to_string()),
            reset_after: Some("X-RateLimit-Reset".to_string()),
        }
    }

    fn trades(&self, ctx: &FetchContext) -> RecordStream {
        let fetch_ctx = ctx.clone();
        let fetch = move |after: Option<String>| fills_page(fetch_ctx.clone(), after);
        let filter_ctx = ctx.clone();
        paginate_last_id(fetch, |item: &Value| key_field(item, "billId"))
            .filter_map(move |result| {
                future::ready(match result {
                    Ok(raw) => {
                        let normalized =
                            normalize_trade(&filter_ctx.account.name, raw).map(Record::Trade);
                        finish_symbol_record(&filter_ctx, EXCHANGE_ID, normalized, "fill")
                    }
                    Err(err) => Some(Err(err)),
                })
            })
            .boxed()
    }

    fn funding(&self, ctx: &FetchContext) -> RecordStream {
        let fetch_ctx = ctx.clone();
        let fetch = move |after: Option<String>| bills_page(fetch_ctx.clone(), after);
        let filter_ctx = ctx.clone();
        paginate_last_id(fetch, |item: &Value| key_field(item, "billId"))
            .filter_map(move |result| {
                future::ready(match result {
                    Ok(raw) => {
                        let normalized = normalize_funding(&filter_ctx.account.name, raw)
                            .map(Record::Funding);
                        finish_symbol_record(&filter_ctx, EXCHANGE_ID, normalized, "funding bill")
                    }
                    Err(err) => Some(Err(err)),
                })
            })
            .boxed()
    }

    fn deposits(&self, ctx: &FetchContext) -> RecordStream {
        asset_stream(ctx, DEPOSITS_PATH, TransferDirection::Deposit)
    }

    fn withdrawals(&self, ctx: &FetchContext) -> RecordStream {
        asset_stream(ctx, WITHDRAWALS_PATH, TransferDirection::Withdrawal)
    }
}

/// Builds the timestamp-paginated stream shared by the asset endpoints.
fn asset_stream(
    ctx: &FetchContext,
    path: &'static str,
    direction: TransferDirection,
) -> RecordStream {
    let fetch_ctx = ctx.clone();
    let fetch = move |after: Option<String>| asset_page(fetch_ctx.clone(), path, after);
    let account_name = ctx.account.name.clone();
    paginate_last_id(fetch, |item: &Value| key_field(item, "ts"))
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

async fn fills_page(
    ctx: FetchContext,
    after: Option<String>,
) -> Result<Page<Value>, ExchangeError> {
    let mut params = vec![
        ("instType".to_string(), inst_type(&ctx.account.account_type)),
        ("begin".to_string(), ctx.range.start_ms().to_string()),
        ("end".to_string(), ctx.range.end_ms().to_string()),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    if let Some(after) = after {
        params.push(("after".to_string(), after));
    }
    let items = signed_get(&ctx, FILLS_PATH, params).await?;
    let has_more = items.len() == PAGE_LIMIT;
    Ok(Page::new(items, has_more, None))
}

async fn bills_page(
    ctx: FetchContext,
    after: Option<String>,
) -> Result<Page<Value>, ExchangeError> {
    let mut params = vec![
        ("type".to_string(), FUNDING_BILL_TYPE.to_string()),
        ("begin".to_string(), ctx.range.start_ms().to_string()),
        ("end".to_string(), ctx.range.end_ms().to_string()),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    if let Some(after) = after {
        params.push(("after".to_string(), after));
    }
    let items = signed_get(&ctx, BILLS_PATH, params).await?;
    let has_more = items.len() == PAGE_LIMIT;
    Ok(Page::new(items, has_more, None))
}

/// Fetches one page of an asset endpoint, newest first.
///
/// `after` excludes everything at or after the given timestamp, so the
/// first page is seeded with the range end and the stream walks backwards.
/// Items before the range start are trimmed; a fully trimmed page leaves
/// nothing to pivot on and pagination stops.
async fn asset_page(
    ctx: FetchContext,
    path: &'static str,
    after: Option<String>,
) -> Result<Page<Value>, ExchangeError> {
    let after = after.unwrap_or_else(|| ctx.range.end_ms().to_string());
    let params = vec![
        ("after".to_string(), after),
        ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    let items = signed_get(&ctx, path, params).await?;
    let fetched = items.len();
    let start_ms = ctx.range.start_ms();
    let mut items = items;
    items.retain(|item| ms_field(item, "ts").is_ok_and(|ts| ts >= start_ms));
    let has_more = fetched == PAGE_LIMIT;
    Ok(Page::new(items, has_more, None))
}

/// Maps the configured account type onto an OKX instrument type, falling
/// back to SWAP (the perpetual-futures universe this tool mostly serves).
fn inst_type(account_type: &str) -> String {
    let upper = account_type.to_uppercase();
    match upper.as_str() {
        "SPOT" | "MARGIN" | "SWAP" | "FUTURES" | "OPTION" => upper,
        _ => "SWAP".to_string(),
    }
}

/// Signs and sends one GET request, returning the envelope's `data` items.
async fn signed_get(
    ctx: &FetchContext,
    path: &'static str,
    params: Vec<(String, String)>,
) -> Result<Vec<Value>, ExchangeError> {
    let account = &ctx.account;
    let passphrase =
        account
            .passphrase
            .as_deref()
            .ok_or_else(|| ExchangeError::MissingCredential {
                account: account.name.clone(),
                field: "passphrase",
            })?;

    let timestamp = format_iso8601(Utc::now());
    let prehash = format!("{timestamp}GET{}", path_with_query(path, &params));
    let signature = hmac_sha256_base64(&account.api_secret, &prehash);

    let mut headers = HeaderMap::new();
    insert_sensitive(&mut headers, "OK-ACCESS-KEY", &account.api_key, &account.name)?;
    insert_sensitive(&mut headers, "OK-ACCESS-SIGN", &signature, &account.name)?;
    headers.insert(
        "OK-ACCESS-TIMESTAMP",
        HeaderValue::from_str(&timestamp)
            .expect("ISO-8601 timestamp should be a valid header value"),
    );
    insert_sensitive(&mut headers, "OK-ACCESS-PASSPHRASE", passphrase, &account.name)?;
    // The `flag` account field selects demo trading ("1") vs live ("0").
    if account.flag.as_deref() == Some("1") {
        headers.insert("x-simulated-trading", HeaderValue::from_static("1"));
    }

    let url = format!("{BASE}{path}");
    let body = ctx.executor.get(&url, &params, &headers).await?;
    unwrap_envelope(body)
}

fn insert_sensitive(
    headers: &mut HeaderMap,
    name: &'static str,
    value: &str,
    account: &str,
) -> Result<(), ExchangeError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| ExchangeError::InvalidCredential {
        account: account.to_string(),
    })?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

/// The signed request path: the path plus the exact query the client sends.
fn path_with_query(path: &str, params: &[(String, String)]) -> String {
    let query = encode_query(params);
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Unwraps the `{code, msg, data}` envelope; OKX reports application
/// errors inside an HTTP 200.
fn unwrap_envelope(body: Value) -> Result<Vec<Value>, ExchangeError> {
    let code = body.get("code").and_then(Value::as_str).unwrap_or("0");
    if code != "0" {
        let msg = body.get("msg").and_then(Value::as_str).unwrap_or("");
        return Err(ExchangeError::Response(format!("okx error {code}: {msg}")));
    }
    Ok(take_array(body, "data"))
}

fn normalize_trade(account_name: &str, raw: Value) -> Result<TradeRecord, NormalizeError> {
    let price = decimal_field(&raw, "fillPx")?;
    let amount = decimal_field(&raw, "fillSz")?;
    let time = event_time_ms(ms_field(&raw, "ts")?, "ts")?;
    Ok(TradeRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        symbol: str_field(&raw, "instId")?.to_string(),
        side: TradeSide::from_exchange(str_field(&raw, "side")?),
        // Fill records do not carry the order type.
        order_type: OrderType::Unknown,
        price,
        amount,
        cost: price * amount,
        // OKX reports charged fees as negative amounts; records carry
        // charges positive, matching the other venues.
        fee: -decimal_field(&raw, "fee")?,
        fee_currency: str_field(&raw, "feeCcy")?.to_string(),
        trade_id: string_field(&raw, "tradeId")?,
        order_id: string_field(&raw, "ordId")?,
        time,
        position_side: raw
            .get("posSide")
            .and_then(Value::as_str)
            .and_then(PositionSide::from_exchange),
        liquidity: raw
            .get("execType")
            .and_then(Value::as_str)
            .and_then(Liquidity::from_exchange),
        fee_rate: opt_decimal_field(&raw, "feeRate")?,
        realized_pnl: opt_decimal_field(&raw, "fillPnl")?,
        raw,
    })
}

fn normalize_funding(account_name: &str, raw: Value) -> Result<FundingRecord, NormalizeError> {
    let time = event_time_ms(ms_field(&raw, "ts")?, "ts")?;
    // Funding settles into `pnl`; older bill payloads only carry the
    // balance change.
    let funding_fee = match opt_decimal_field(&raw, "pnl")? {
        Some(fee) => fee,
        None => decimal_field(&raw, "balChg")?,
    };
    Ok(FundingRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        symbol: str_field(&raw, "instId")?.to_string(),
        funding_rate: None,
        funding_fee,
        position_size: opt_decimal_field(&raw, "sz")?,
        time,
        settlement_period: None,
        funding_index: None,
        cycle: None,
        raw,
    })
}

fn normalize_deposit(account_name: &str, raw: Value) -> Result<TransferRecord, NormalizeError> {
    let time = event_time_ms(ms_field(&raw, "ts")?, "ts")?;
    Ok(TransferRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        direction: TransferDirection::Deposit,
        currency: str_field(&raw, "ccy")?.to_string(),
        amount: decimal_field(&raw, "amt")?,
        network: opt_str_field(&raw, "chain").map(ToString::to_string),
        address: opt_str_field(&raw, "to").map(ToString::to_string),
        tx_hash: opt_str_field(&raw, "txId").map(ToString::to_string),
        status: deposit_state(state_code(&raw)),
        time,
        fee: None,
        fee_currency: None,
        // An internal transfer carries the sender's withdrawal id instead
        // of an on-chain transaction.
        internal_transfer: opt_str_field(&raw, "fromWdId").is_some(),
        tag: None,
        memo: None,
        raw,
    })
}

fn normalize_withdrawal(account_name: &str, raw: Value) -> Result<TransferRecord, NormalizeError> {
    let time = event_time_ms(ms_field(&raw, "ts")?, "ts")?;
    let currency = str_field(&raw, "ccy")?.to_string();
    Ok(TransferRecord {
        meta: RecordMeta::new(EXCHANGE_ID, account_name),
        direction: TransferDirection::Withdrawal,
        currency: currency.clone(),
        amount: decimal_field(&raw, "amt")?,
        network: opt_str_field(&raw, "chain").map(ToString::to_string),
        address: opt_str_field(&raw, "to").map(ToString::to_string),
        tx_hash: opt_str_field(&raw, "txId").map(ToString::to_string),
        status: withdrawal_state(state_code(&raw)),
        time,
        fee: opt_decimal_field(&raw, "fee")?,
        fee_currency: opt_str_field(&raw, "feeCcy")
            .map(ToString::to_string)
            .or(Some(currency)),
        internal_transfer: false,
        tag: opt_str_field(&raw, "tag").map(ToString::to_string),
        memo: opt_str_field(&raw, "memo").map(ToString::to_string),
        raw,
    })
}

/// `state` is a stringified integer on OKX.
fn state_code(raw: &Value) -> Option<i64> {
    match raw.get("state") {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}

/// Deposit states: 0 waiting for confirmation, 1 credited, 2 successful.
const fn deposit_state(code: Option<i64>) -> TransferStatus {
    match code {
        Some(0 | 1) => TransferStatus::Pending,
        Some(2) => TransferStatus::Success,
        _ => TransferStatus::Unknown,
    }
}

/// Withdrawal states: negatives are cancellations and failures, 2 is sent,
/// the rest of 0..=5 are in-flight and verification states.
const fn withdrawal_state(code: Option<i64>) -> TransferStatus {
    match code {
        Some(-2 | -1) => TransferStatus::Failed,
        Some(-3 | 0 | 1 | 3 | 4 | 5) => TransferStatus::Pending,
        Some(2) => TransferStatus::Success,
        _ => TransferStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_normalize_fill() {
        let raw = json!({
            "instId": "BTC-USDT-SWAP",
            "tradeId": "742931",
            "ordId": "312269865356374016",
            "billId": "1100000000",
            "side": "sell",
            "fillPx": "43210.5",
            "fillSz": "2",
            "fee": "-0.0432105",
            "feeCcy": "USDT",
            "execType": "M",
            "posSide": "net",
            "fillPnl": "12.5",
            "ts": "1640995200000"
        });
        let trade = normalize_trade("alt", raw).unwrap();

        assert_eq!(trade.meta.exchange, "okx");
        assert_eq!(trade.symbol, "BTC-USDT-SWAP");
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.order_type, OrderType::Unknown);
        assert_eq!(trade.cost, Decimal::from_str("86421.0").unwrap());
        // The charged fee flips positive.
        assert_eq!(trade.fee, Decimal::from_str("0.0432105").unwrap());
        assert_eq!(trade.liquidity, Some(Liquidity::Maker));
        assert_eq!(trade.position_side, Some(PositionSide::Dual));
        assert_eq!(trade.realized_pnl, Some(Decimal::from_str("12.5").unwrap()));
        assert_eq!(trade.time.datetime(), "2022-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_normalize_funding_bill() {
        let raw = json!({
            "instId": "ETH-USDT-SWAP",
            "billId": "1100000001",
            "pnl": "-0.81",
            "sz": "10",
            "ts": "1641024000000"
        });
        let funding = normalize_funding("alt", raw).unwrap();
        assert_eq!(funding.symbol, "ETH-USDT-SWAP");
        assert_eq!(funding.funding_fee, Decimal::from_str("-0.81").unwrap());
        assert_eq!(funding.position_size, Some(Decimal::from(10)));
    }

    #[test]
    fn test_normalize_funding_bill_balance_change_fallback() {
        let raw = json!({
            "instId": "ETH-USDT-SWAP",
            "balChg": "0.33",
            "ts": "1641024000000"
        });
        let funding = normalize_funding("alt", raw).unwrap();
        assert_eq!(funding.funding_fee, Decimal::from_str("0.33").unwrap());
    }

    #[test]
    fn test_deposit_state_map() {
        for (code, expected) in [
            ("0", TransferStatus::Pending),
            ("1", TransferStatus::Pending),
            ("2", TransferStatus::Success),
            ("13", TransferStatus::Unknown),
        ] {
            let raw = json!({
                "ccy": "USDT",
                "amt": "100",
                "chain": "USDT-TRC20",
                "state": code,
                "ts": "1640995200000"
            });
            let deposit = normalize_deposit("alt", raw).unwrap();
            assert_eq!(deposit.status, expected, "state {code}");
        }
    }

    #[test]
    fn test_withdrawal_state_map() {
        for (code, expected) in [
            ("-2", TransferStatus::Failed),
            ("-1", TransferStatus::Failed),
            ("-3", TransferStatus::Pending),
            ("0", TransferStatus::Pending),
            ("2", TransferStatus::Success),
            ("4", TransferStatus::Pending),
            ("17", TransferStatus::Unknown),
        ] {
            let raw = json!({
                "ccy": "BTC",
                "amt": "0.5",
                "state": code,
                "ts": "1640995200000",
                "fee": "0.0002"
            });
            let withdrawal = normalize_withdrawal("alt", raw).unwrap();
            assert_eq!(withdrawal.status, expected, "state {code}");
        }
    }

    #[test]
    fn test_withdrawal_fee_currency_falls_back_to_coin() {
        let raw = json!({
            "ccy": "BTC",
            "amt": "0.5",
            "state": "2",
            "ts": "1640995200000",
            "fee": "0.0002"
        });
        let withdrawal = normalize_withdrawal("alt", raw).unwrap();
        assert_eq!(withdrawal.fee_currency.as_deref(), Some("BTC"));
    }

    #[test]
    fn test_internal_deposit_detection() {
        let raw = json!({
            "ccy": "USDT",
            "amt": "100",
            "state": "2",
            "ts": "1640995200000",
            "fromWdId": "25147041"
        });
        assert!(normalize_deposit("alt", raw).unwrap().internal_transfer);
    }

    #[test]
    fn test_unwrap_envelope() {
        let ok = json!({"code": "0", "msg": "", "data": [{"a": 1}]});
        assert_eq!(unwrap_envelope(ok).unwrap().len(), 1);

        let err = json!({"code": "50011", "msg": "rate limit reached", "data": []});
        let failure = unwrap_envelope(err).unwrap_err();
        assert!(failure.to_string().contains("okx error 50011"));

        // An envelope without a code is treated as success.
        assert!(unwrap_envelope(json!({"data": []})).unwrap().is_empty());
    }

    #[test]
    fn test_inst_type_mapping() {
        assert_eq!(inst_type("spot"), "SPOT");
        assert_eq!(inst_type("FUTURES"), "FUTURES");
        assert_eq!(inst_type("trading"), "SWAP");
        assert_eq!(inst_type("portfolio_margin"), "SWAP");
    }

    #[test]
    fn test_signed_request_path() {
        let params = [
            ("after".to_string(), "1640995200000".to_string()),
            ("limit".to_string(), "100".to_string()),
        ];
        assert_eq!(
            path_with_query(DEPOSITS_PATH, &params),
            "/api/v5/asset/deposit-history?after=1640995200000&limit=100"
        );
        assert_eq!(path_with_query(DEPOSITS_PATH, &[]), DEPOSITS_PATH);
    }
}
