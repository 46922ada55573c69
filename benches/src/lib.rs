//! Shared fixtures for zonda benchmarks.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use zonda_types::{
    EventTime, Liquidity, OrderType, PositionSide, Record, RecordMeta, TradeRecord, TradeSide,
};

/// Items per synthetic page.
pub const PAGE_SIZE: usize = 100;

/// Base timestamp of the synthetic data set.
#[must_use]
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().expect("valid timestamp")
}

/// A raw fill shaped like a typical exchange response item.
#[must_use]
pub fn raw_fill(id: u64) -> Value {
    json!({
        "id": id.to_string(),
        "symbol": "BTCUSDT",
        "side": "BUY",
        "price": "42000.5",
        "qty": "0.25",
        "commission": "0.105",
        "commissionAsset": "USDT",
        "time": 1_700_000_000_000_i64 + id as i64,
    })
}

/// Builds `count` raw fills with sequential ids starting at `first_id`.
#[must_use]
pub fn raw_fills(first_id: u64, count: usize) -> Vec<Value> {
    (first_id..first_id + count as u64).map(raw_fill).collect()
}

/// A fully populated trade record, for writer benchmarks.
#[must_use]
pub fn trade_record(id: u64) -> Record {
    Record::Trade(TradeRecord {
        meta: RecordMeta::new("binance_pm", "main"),
        symbol: "BTCUSDT".to_string(),
        side: TradeSide::Buy,
        order_type: OrderType::Limit,
        price: Decimal::new(420_005, 1),
        amount: Decimal::new(25, 2),
        cost: Decimal::new(1_050_012_5, 3),
        fee: Decimal::new(105, 3),
        fee_currency: "USDT".to_string(),
        trade_id: id.to_string(),
        order_id: (id * 10).to_string(),
        time: EventTime::from_ms(1_700_000_000_000 + id as i64)
            .expect("fixture timestamp should be in range"),
        position_side: Some(PositionSide::Long),
        liquidity: Some(Liquidity::Maker),
        fee_rate: Some(Decimal::new(1, 4)),
        realized_pnl: None,
        raw: raw_fill(id),
    })
}
