//! Unified account-history records shared by every exchange adapter.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::time::{format_iso8601, from_timestamp_ms};

/// Provenance header carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMeta {
    /// Exchange identifier, e.g. `binance_pm`.
    pub exchange: String,
    /// Logical account name from the configuration.
    pub account_name: String,
    /// Where the record came from, e.g. `rest`.
    pub source: String,
    /// When this process ingested the record (UTC).
    pub ingested_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Creates a meta header stamped with the current time, with the
    /// default `rest` source.
    #[must_use]
    pub fn new(exchange: &str, account_name: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            account_name: account_name.to_string(),
            source: "rest".to_string(),
            ingested_at: Utc::now(),
        }
    }
}

/// Event time of a record, kept in two synchronized renderings.
///
/// `timestamp` is UTC epoch milliseconds; `datetime` is the same instant as
/// millisecond-precision ISO-8601 with a `Z` suffix. The two can only be
/// built together, so they cannot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTime {
    timestamp: i64,
    datetime: String,
}

impl EventTime {
    /// Builds an event time from UTC epoch milliseconds.
    ///
    /// Returns `None` for values outside the representable datetime range.
    #[must_use]
    pub fn from_ms(timestamp_ms: i64) -> Option<Self> {
        let dt = from_timestamp_ms(timestamp_ms)?;
        Some(Self {
            timestamp: timestamp_ms,
            datetime: format_iso8601(dt),
        })
    }

    /// Builds an event time from a UTC datetime, truncating to milliseconds.
    #[must_use]
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::from_ms(dt.timestamp_millis()).expect("millisecond truncation should stay in range")
    }

    /// UTC epoch milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// ISO-8601 rendering with millisecond precision, e.g.
    /// `2022-01-01T00:00:00.000Z`.
    #[must_use]
    pub fn datetime(&self) -> &str {
        &self.datetime
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.datetime)
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
    /// Unrecognized side value.
    Unknown,
}

impl TradeSide {
    /// Maps an exchange-reported side, falling back to [`Self::Unknown`].
    #[must_use]
    pub fn from_exchange(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            _ => Self::Unknown,
        }
    }

    /// Returns the side as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type that produced a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Limit order.
    Limit,
    /// Market order.
    Market,
    /// Stop-limit order.
    Stop,
    /// Stop-market order.
    StopMarket,
    /// Take-profit limit order.
    TakeProfit,
    /// Take-profit market order.
    TakeProfitMarket,
    /// Forced liquidation fill.
    Liquidation,
    /// Unrecognized order type.
    Unknown,
}

impl OrderType {
    /// Maps an exchange-reported order type, falling back to
    /// [`Self::Unknown`].
    #[must_use]
    pub fn from_exchange(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "limit" => Self::Limit,
            "market" => Self::Market,
            "stop" | "stop_limit" => Self::Stop,
            "stop_market" => Self::StopMarket,
            "take_profit" => Self::TakeProfit,
            "take_profit_market" => Self::TakeProfitMarket,
            "liquidation" => Self::Liquidation,
            _ => Self::Unknown,
        }
    }

    /// Returns the order type as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
            Self::Stop => "stop",
            Self::StopMarket => "stop_market",
            Self::TakeProfit => "take_profit",
            Self::TakeProfitMarket => "take_profit_market",
            Self::Liquidation => "liquidation",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a fill added or removed book liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liquidity {
    /// Maker fill.
    Maker,
    /// Taker fill.
    Taker,
}

impl Liquidity {
    /// Maps an exchange-reported liquidity marker (`maker`/`taker`, or the
    /// single-letter `M`/`T` some venues use). Returns `None` for anything
    /// else.
    #[must_use]
    pub fn from_exchange(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "maker" | "m" => Some(Self::Maker),
            "taker" | "t" => Some(Self::Taker),
            _ => None,
        }
    }

    /// Returns the liquidity as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Maker => "maker",
            Self::Taker => "taker",
        }
    }
}

impl std::fmt::Display for Liquidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position side of a derivatives fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// Long position.
    Long,
    /// Short position.
    Short,
    /// One-way (dual / both) position mode.
    Dual,
}

impl PositionSide {
    /// Maps an exchange-reported position side. Returns `None` for anything
    /// unrecognized.
    #[must_use]
    pub fn from_exchange(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "long" => Some(Self::Long),
            "short" => Some(Self::Short),
            "both" | "dual" | "net" => Some(Self::Dual),
            _ => None,
        }
    }

    /// Returns the position side as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
            Self::Dual => "dual",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of an on-chain or internal transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Funds moving into the account.
    Deposit,
    /// Funds moving out of the account.
    Withdrawal,
}

impl TransferDirection {
    /// Returns the direction as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Not yet settled.
    Pending,
    /// Settled successfully.
    Success,
    /// Rejected or reverted.
    Failed,
    /// Unrecognized status value.
    Unknown,
}

impl TransferStatus {
    /// Returns the status as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a standalone fee or adjustment entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Commission charged on a trade.
    TradingFee,
    /// Perpetual funding payment.
    FundingFee,
    /// Margin or loan interest.
    Interest,
    /// Interest earned on deposited assets.
    EarnInterest,
    /// Liquidation penalty.
    Liquidation,
    /// Fee rebate.
    Rebate,
    /// Promotional bonus or airdrop.
    Bonus,
}

impl FeeKind {
    /// Returns the fee kind as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TradingFee => "trading_fee",
            Self::FundingFee => "funding_fee",
            Self::Interest => "interest",
            Self::EarnInterest => "earn_interest",
            Self::Liquidation => "liquidation",
            Self::Rebate => "rebate",
            Self::Bonus => "bonus",
        }
    }
}

impl std::fmt::Display for FeeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single executed trade (fill).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    /// Provenance header.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Normalized symbol, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Trade side.
    pub side: TradeSide,
    /// Order type that produced the fill.
    pub order_type: OrderType,
    /// Execution price.
    pub price: Decimal,
    /// Executed base amount.
    pub amount: Decimal,
    /// Quote cost (`price * amount`).
    pub cost: Decimal,
    /// Fee charged for this fill.
    pub fee: Decimal,
    /// Currency the fee was charged in.
    pub fee_currency: String,
    /// Exchange trade identifier.
    pub trade_id: String,
    /// Exchange order identifier.
    pub order_id: String,
    /// Execution time.
    #[serde(flatten)]
    pub time: EventTime,
    /// Position side, for derivatives venues that report it.
    pub position_side: Option<PositionSide>,
    /// Maker/taker marker, when reported.
    pub liquidity: Option<Liquidity>,
    /// Fee rate, when reported.
    pub fee_rate: Option<Decimal>,
    /// Realized PnL booked with the fill, when reported.
    pub realized_pnl: Option<Decimal>,
    /// Original payload the record was normalized from.
    #[serde(skip_serializing)]
    pub raw: Value,
}

/// A periodic funding payment on a perpetual position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingRecord {
    /// Provenance header.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Normalized symbol.
    pub symbol: String,
    /// Funding rate applied, when reported.
    pub funding_rate: Option<Decimal>,
    /// Funding amount paid (negative) or received (positive).
    pub funding_fee: Decimal,
    /// Position size at settlement, when reported.
    pub position_size: Option<Decimal>,
    /// Settlement time.
    #[serde(flatten)]
    pub time: EventTime,
    /// Settlement period, e.g. `8h`.
    pub settlement_period: Option<String>,
    /// Funding mark index at settlement, when reported.
    pub funding_index: Option<String>,
    /// Settlement cycle marker, when reported.
    pub cycle: Option<String>,
    /// Original payload the record was normalized from.
    #[serde(skip_serializing)]
    pub raw: Value,
}

/// A deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferRecord {
    /// Provenance header.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Asset transferred.
    pub currency: String,
    /// Amount transferred.
    pub amount: Decimal,
    /// Chain or network name, when applicable.
    pub network: Option<String>,
    /// Destination or origin address, when reported.
    pub address: Option<String>,
    /// On-chain transaction hash, when applicable.
    pub tx_hash: Option<String>,
    /// Settlement state.
    pub status: TransferStatus,
    /// Transfer time.
    #[serde(flatten)]
    pub time: EventTime,
    /// Transfer fee, when reported.
    pub fee: Option<Decimal>,
    /// Currency the fee was charged in.
    pub fee_currency: Option<String>,
    /// True for internal (off-chain) transfers between venue accounts.
    pub internal_transfer: bool,
    /// Address tag, when the chain uses one.
    pub tag: Option<String>,
    /// Address memo, when the chain uses one.
    pub memo: Option<String>,
    /// Original payload the record was normalized from.
    #[serde(skip_serializing)]
    pub raw: Value,
}

/// A standalone fee or balance adjustment entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRecord {
    /// Provenance header.
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Fee category.
    #[serde(rename = "fee_type")]
    pub kind: FeeKind,
    /// Currency the fee was charged in.
    pub currency: String,
    /// Fee amount (negative for charges, positive for credits).
    pub amount: Decimal,
    /// Charge time.
    #[serde(flatten)]
    pub time: EventTime,
    /// Related trade identifier, when applicable.
    pub trade_id: Option<String>,
    /// Related order identifier, when applicable.
    pub order_id: Option<String>,
    /// Related funding event identifier, when applicable.
    pub funding_id: Option<String>,
    /// Original payload the record was normalized from.
    #[serde(skip_serializing)]
    pub raw: Value,
}

/// Any normalized record, over all supported kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    /// An executed trade.
    Trade(TradeRecord),
    /// A funding payment.
    Funding(FundingRecord),
    /// A deposit or withdrawal.
    Transfer(TransferRecord),
    /// A standalone fee entry.
    Fee(FeeRecord),
}

impl Record {
    /// Returns the history kind this record is filed under. Transfers map to
    /// [`RecordKind::Deposits`] or [`RecordKind::Withdrawals`] by direction.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Trade(_) => RecordKind::Trades,
            Self::Funding(_) => RecordKind::Funding,
            Self::Transfer(t) => match t.direction {
                TransferDirection::Deposit => RecordKind::Deposits,
                TransferDirection::Withdrawal => RecordKind::Withdrawals,
            },
            Self::Fee(_) => RecordKind::Fees,
        }
    }

    /// Provenance header of the record.
    #[must_use]
    pub const fn meta(&self) -> &RecordMeta {
        match self {
            Self::Trade(r) => &r.meta,
            Self::Funding(r) => &r.meta,
            Self::Transfer(r) => &r.meta,
            Self::Fee(r) => &r.meta,
        }
    }

    /// Event time of the record.
    #[must_use]
    pub const fn time(&self) -> &EventTime {
        match self {
            Self::Trade(r) => &r.time,
            Self::Funding(r) => &r.time,
            Self::Transfer(r) => &r.time,
            Self::Fee(r) => &r.time,
        }
    }

    /// Event time as UTC epoch milliseconds.
    #[must_use]
    pub const fn timestamp_ms(&self) -> i64 {
        self.time().timestamp()
    }
}

/// Identifier for a kind of account history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Executed trades.
    Trades,
    /// Funding payments.
    Funding,
    /// Deposits.
    Deposits,
    /// Withdrawals.
    Withdrawals,
    /// Standalone fee entries.
    Fees,
}

impl RecordKind {
    /// Returns the kind as a string identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Funding => "funding",
            Self::Deposits => "deposits",
            Self::Withdrawals => "withdrawals",
            Self::Fees => "fees",
        }
    }

    /// Returns all history kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Trades,
            Self::Funding,
            Self::Deposits,
            Self::Withdrawals,
            Self::Fees,
        ]
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = RecordKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trades" | "trade" => Ok(Self::Trades),
            "funding" => Ok(Self::Funding),
            "deposits" | "deposit" => Ok(Self::Deposits),
            "withdrawals" | "withdrawal" => Ok(Self::Withdrawals),
            "fees" | "fee" => Ok(Self::Fees),
            _ => Err(RecordKindParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid history kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKindParseError(String);

impl std::fmt::Display for RecordKindParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid history kind '{}', expected one of: trades, funding, deposits, withdrawals, fees",
            self.0
        )
    }
}

impl std::error::Error for RecordKindParseError {}
