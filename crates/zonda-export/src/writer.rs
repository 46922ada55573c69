//! Record serialization into CSV and NDJSON.

use std::fmt;
use std::io::Write;

use zonda_types::{
    FeeRecord, FundingRecord, Record, RecordKind, RecordMeta, TradeRecord, TransferRecord,
    format_iso8601,
};

use crate::format::{ExportError, ExportFormat};

const TRADE_HEADER: &str = "exchange,account_name,source,ingested_at,symbol,side,order_type,\
     price,amount,cost,fee,fee_currency,trade_id,order_id,timestamp,datetime,position_side,\
     liquidity,fee_rate,realized_pnl";

const FUNDING_HEADER: &str = "exchange,account_name,source,ingested_at,symbol,funding_rate,\
     funding_fee,position_size,timestamp,datetime,settlement_period,funding_index,cycle";

const TRANSFER_HEADER: &str = "exchange,account_name,source,ingested_at,direction,currency,\
     amount,network,address,tx_hash,status,timestamp,datetime,fee,fee_currency,\
     internal_transfer,tag,memo";

const FEE_HEADER: &str = "exchange,account_name,source,ingested_at,fee_type,currency,amount,\
     trade_id,order_id,funding_id,timestamp,datetime";

/// The CSV header row for a record kind. Deposits and withdrawals share
/// the transfer columns.
#[must_use]
pub const fn csv_header(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Trades => TRADE_HEADER,
        RecordKind::Funding => FUNDING_HEADER,
        RecordKind::Deposits | RecordKind::Withdrawals => TRANSFER_HEADER,
        RecordKind::Fees => FEE_HEADER,
    }
}

/// Streaming writer for the records of one unit.
///
/// Rows are written one record at a time, so a unit's stream can be
/// exported without collecting it. For CSV the header row is written on
/// construction; an empty unit still produces a well-formed file.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    sink: W,
    format: ExportFormat,
}

impl<W: Write> RecordWriter<W> {
    /// Creates a writer for records of `kind`, writing the CSV header row
    /// up front when the format calls for one.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(mut sink: W, format: ExportFormat, kind: RecordKind) -> Result<Self, ExportError> {
        if format == ExportFormat::Csv {
            writeln!(sink, "{}", csv_header(kind))?;
        }
        Ok(Self { sink, format })
    }

    /// Writes one record as a CSV row or an NDJSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or serialization fails.
    pub fn write(&mut self, record: &Record) -> Result<(), ExportError> {
        match self.format {
            ExportFormat::Csv => match record {
                Record::Trade(trade) => self.trade_row(trade),
                Record::Funding(funding) => self.funding_row(funding),
                Record::Transfer(transfer) => self.transfer_row(transfer),
                Record::Fee(fee) => self.fee_row(fee),
            },
            ExportFormat::Ndjson => {
                serde_json::to_writer(&mut self.sink, record)?;
                self.sink.write_all(b"\n")?;
                Ok(())
            }
        }
    }

    /// Flushes buffered output and hands the sink back.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<W, ExportError> {
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn trade_row(&mut self, trade: &TradeRecord) -> Result<(), ExportError> {
        meta_fields(&mut self.sink, &trade.meta)?;
        write!(
            self.sink,
            ",{},{},{},{},{},{},{},{},{},{}",
            trade.symbol,
            trade.side,
            trade.order_type,
            trade.price,
            trade.amount,
            trade.cost,
            trade.fee,
            trade.fee_currency,
            trade.trade_id,
            trade.order_id,
        )?;
        writeln!(
            self.sink,
            ",{},{},{},{},{},{}",
            trade.time.timestamp(),
            trade.time.datetime(),
            opt(&trade.position_side),
            opt(&trade.liquidity),
            opt(&trade.fee_rate),
            opt(&trade.realized_pnl),
        )?;
        Ok(())
    }

    fn funding_row(&mut self, funding: &FundingRecord) -> Result<(), ExportError> {
        meta_fields(&mut self.sink, &funding.meta)?;
        writeln!(
            self.sink,
            ",{},{},{},{},{},{},{},{},{}",
            funding.symbol,
            opt(&funding.funding_rate),
            funding.funding_fee,
            opt(&funding.position_size),
            funding.time.timestamp(),
            funding.time.datetime(),
            text(&funding.settlement_period),
            text(&funding.funding_index),
            text(&funding.cycle),
        )?;
        Ok(())
    }

    fn transfer_row(&mut self, transfer: &TransferRecord) -> Result<(), ExportError> {
        meta_fields(&mut self.sink, &transfer.meta)?;
        write!(
            self.sink,
            ",{},{},{},{},{},{},{}",
            transfer.direction,
            transfer.currency,
            transfer.amount,
            text(&transfer.network),
            text(&transfer.address),
            text(&transfer.tx_hash),
            transfer.status,
        )?;
        writeln!(
            self.sink,
            ",{},{},{},{},{},{},{}",
            transfer.time.timestamp(),
            transfer.time.datetime(),
            opt(&transfer.fee),
            text(&transfer.fee_currency),
            transfer.internal_transfer,
            text(&transfer.tag),
            text(&transfer.memo),
        )?;
        Ok(())
    }

    fn fee_row(&mut self, fee: &FeeRecord) -> Result<(), ExportError> {
        meta_fields(&mut self.sink, &fee.meta)?;
        writeln!(
            self.sink,
            ",{},{},{},{},{},{},{},{}",
            fee.kind,
            fee.currency,
            fee.amount,
            text(&fee.trade_id),
            text(&fee.order_id),
            text(&fee.funding_id),
            fee.time.timestamp(),
            fee.time.datetime(),
        )?;
        Ok(())
    }
}

fn meta_fields<W: Write>(sink: &mut W, meta: &RecordMeta) -> Result<(), ExportError> {
    write!(
        sink,
        "{},{},{},{}",
        meta.exchange,
        meta.account_name,
        meta.source,
        format_iso8601(meta.ingested_at),
    )?;
    Ok(())
}

/// Renders an optional field, empty when absent. For values that cannot
/// contain CSV metacharacters (decimals, enums).
const fn opt<T>(value: &Option<T>) -> OptField<'_, T> {
    OptField(value)
}

struct OptField<'a, T>(&'a Option<T>);

impl<T: fmt::Display> fmt::Display for OptField<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => value.fmt(f),
            None => Ok(()),
        }
    }
}

/// Renders an optional free-text field, empty when absent and quoted when
/// the value contains a delimiter. Memos and tags are user-supplied.
const fn text(value: &Option<String>) -> TextField<'_> {
    TextField(value)
}

struct TextField<'a>(&'a Option<String>);

impl fmt::Display for TextField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(value) = self.0 else { return Ok(()) };
        if value.contains([',', '"', '\n', '\r']) {
            write!(f, "\"{}\"", value.replace('"', "\"\""))
        } else {
            f.write_str(value)
        }
    }
}
