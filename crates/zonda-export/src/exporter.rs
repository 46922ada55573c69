//! Filesystem layout and streaming export of unit files.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::pin::pin;

use futures::{Stream, StreamExt};
use zonda_types::{Record, RecordKind, TimeRange};

use crate::format::{ExportError, ExportFormat};
use crate::writer::RecordWriter;

/// Writes unit files under a fixed directory layout.
///
/// Each unit (exchange, account, kind, range) lands in its own file at
/// `{out}/{exchange}/{account}/{kind}/{exchange}_{account}_{kind}_{start}_{end}.{ext}`
/// with the range rendered as UTC dates.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    format: ExportFormat,
}

impl Exporter {
    /// Creates an exporter rooted at `output_dir`. Directories are created
    /// lazily as units are written.
    pub fn new(output_dir: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            output_dir: output_dir.into(),
            format,
        }
    }

    /// The format unit files are written in.
    #[must_use]
    pub const fn format(&self) -> ExportFormat {
        self.format
    }

    /// The file a unit's records land in.
    #[must_use]
    pub fn unit_path(
        &self,
        exchange: &str,
        account: &str,
        kind: RecordKind,
        range: &TimeRange,
    ) -> PathBuf {
        let filename = format!(
            "{exchange}_{account}_{kind}_{start}_{end}.{ext}",
            start = range.start.date_naive(),
            end = range.end.date_naive(),
            ext = self.format.extension(),
        );
        self.output_dir
            .join(exchange)
            .join(account)
            .join(kind.as_str())
            .join(filename)
    }

    /// Writes a unit's record stream to its file as records arrive,
    /// returning how many records were written.
    ///
    /// The file and its parent directories are created up front, so a unit
    /// that yields nothing still produces a file (with a header row for
    /// CSV). The stream is consumed exactly once and never collected.
    ///
    /// # Errors
    ///
    /// Stream errors propagate unchanged; filesystem and serialization
    /// failures are converted into `E` first.
    pub async fn export_unit<S, E>(
        &self,
        exchange: &str,
        account: &str,
        kind: RecordKind,
        range: &TimeRange,
        records: S,
    ) -> Result<u64, E>
    where
        S: Stream<Item = Result<Record, E>>,
        E: From<ExportError>,
    {
        let path = self.unit_path(exchange, account, kind, range);
        let mut writer = create_writer(&path, self.format, kind).map_err(E::from)?;

        let mut records = pin!(records);
        let mut written = 0u64;
        while let Some(record) = records.next().await {
            writer.write(&record?).map_err(E::from)?;
            written += 1;
        }
        writer.finish().map_err(E::from)?;
        Ok(written)
    }
}

fn create_writer(
    path: &Path,
    format: ExportFormat,
    kind: RecordKind,
) -> Result<RecordWriter<BufWriter<File>>, ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    RecordWriter::new(BufWriter::new(file), format, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use zonda_types::{
        EventTime, RecordMeta, TransferDirection, TransferRecord, TransferStatus,
        from_timestamp_ms,
    };

    fn range() -> TimeRange {
        TimeRange::new(
            from_timestamp_ms(1_704_067_200_000).unwrap(),
            from_timestamp_ms(1_706_745_600_000).unwrap(),
        )
        .unwrap()
    }

    fn deposit(tx_hash: &str) -> Record {
        Record::Transfer(TransferRecord {
            meta: RecordMeta {
                exchange: "okx".to_string(),
                account_name: "main".to_string(),
                source: "rest".to_string(),
                ingested_at: from_timestamp_ms(1_700_000_000_000).unwrap(),
            },
            direction: TransferDirection::Deposit,
            currency: "USDT".to_string(),
            amount: Decimal::from(250),
            network: None,
            address: None,
            tx_hash: Some(tx_hash.to_string()),
            status: TransferStatus::Success,
            time: EventTime::from_ms(1_704_100_000_000).unwrap(),
            fee: None,
            fee_currency: None,
            internal_transfer: false,
            tag: None,
            memo: None,
            raw: Value::Null,
        })
    }

    #[test]
    fn test_unit_path_layout() {
        let exporter = Exporter::new("/tmp/out", ExportFormat::Csv);
        let path = exporter.unit_path("okx", "main", RecordKind::Deposits, &range());
        assert_eq!(
            path,
            PathBuf::from("/tmp/out/okx/main/deposits/okx_main_deposits_2024-01-01_2024-02-01.csv")
        );
    }

    #[tokio::test]
    async fn test_export_unit_streams_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), ExportFormat::Csv);
        let records = stream::iter(vec![
            Ok::<_, ExportError>(deposit("0xaaa")),
            Ok(deposit("0xbbb")),
        ]);

        let written = exporter
            .export_unit("okx", "main", RecordKind::Deposits, &range(), records)
            .await
            .unwrap();
        assert_eq!(written, 2);

        let path = exporter.unit_path("okx", "main", RecordKind::Deposits, &range());
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("exchange,account_name"));
        assert!(lines[1].contains("0xaaa"));
        assert!(lines[2].contains("0xbbb"));
    }

    #[tokio::test]
    async fn test_empty_unit_writes_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), ExportFormat::Csv);
        let records = stream::iter(Vec::<Result<Record, ExportError>>::new());

        let written = exporter
            .export_unit("okx", "main", RecordKind::Trades, &range(), records)
            .await
            .unwrap();
        assert_eq!(written, 0);

        let path = exporter.unit_path("okx", "main", RecordKind::Trades, &range());
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), ExportFormat::Ndjson);
        let records = stream::iter(vec![
            Ok(deposit("0xaaa")),
            Err(ExportError::Io(std::io::Error::other("connection reset"))),
        ]);

        let err = exporter
            .export_unit("okx", "main", RecordKind::Deposits, &range(), records)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
