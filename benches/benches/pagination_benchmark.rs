//! Pagination and writer benchmarks over synthetic in-memory data.
//!
//! Run with: `cargo bench --package zonda-bench`

use chrono::TimeDelta;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::StreamExt;
use std::convert::Infallible;
use tokio::runtime::Runtime;
use zonda_bench::{PAGE_SIZE, base_time, raw_fills, trade_record};
use zonda_export::{ExportFormat, RecordWriter};
use zonda_fetch::{Page, item_key, paginate_cursor, paginate_last_id, paginate_windows, pivot_key};
use zonda_types::{Record, RecordKind, TimeRange, Window};

/// Total item counts driven through each strategy.
const TOTALS: &[usize] = &[1_000, 10_000];

fn cursor_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("paginate_cursor");

    for &total in TOTALS {
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.to_async(&runtime).iter(|| async move {
                let pages = total / PAGE_SIZE;
                let stream = paginate_cursor(move |cursor: Option<String>| async move {
                    let page_no: usize = cursor.map_or(0, |c| c.parse().expect("numeric cursor"));
                    let has_more = page_no + 1 < pages;
                    Ok::<_, Infallible>(Page::new(
                        raw_fills((page_no * PAGE_SIZE) as u64, PAGE_SIZE),
                        has_more,
                        has_more.then(|| (page_no + 1).to_string()),
                    ))
                });
                let count = stream.count().await;
                assert_eq!(count, total);
            });
        });
    }

    group.finish();
}

fn last_id_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("paginate_last_id");

    for &total in TOTALS {
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.to_async(&runtime).iter(|| async move {
                let stream = paginate_last_id(
                    move |last_id: Option<String>| async move {
                        let first =
                            last_id.map_or(0, |id| id.parse::<u64>().expect("numeric id") + 1);
                        let has_more = first as usize + PAGE_SIZE < total;
                        Ok::<_, Infallible>(Page::new(raw_fills(first, PAGE_SIZE), has_more, None))
                    },
                    pivot_key,
                );
                let count = stream.count().await;
                assert_eq!(count, total);
            });
        });
    }

    group.finish();
}

fn windows_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("paginate_windows");

    for &total in TOTALS {
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.to_async(&runtime).iter(|| async move {
                let start = base_time();
                let range = TimeRange::new(start, start + TimeDelta::seconds(total as i64))
                    .expect("valid range");
                let windows = range
                    .windows_with_overlap(TimeDelta::seconds(100), TimeDelta::seconds(10))
                    .expect("valid window plan");

                // One item per second; the overlap re-fetches the trailing
                // ten, which the dedup layer has to drop.
                let stream = paginate_windows(
                    windows,
                    move |window: Window| async move {
                        let first = (window.start - start).num_seconds() as u64;
                        let count = window.duration().num_seconds() as usize;
                        Ok::<_, Infallible>(raw_fills(first, count))
                    },
                    item_key,
                );
                let count = stream.count().await;
                assert_eq!(count, total);
            });
        });
    }

    group.finish();
}

fn writer_benchmark(c: &mut Criterion) {
    let records: Vec<Record> = (0..10_000u64).map(trade_record).collect();
    let mut group = c.benchmark_group("record_writer");
    group.throughput(Throughput::Elements(records.len() as u64));

    for format in [ExportFormat::Csv, ExportFormat::Ndjson] {
        group.bench_with_input(BenchmarkId::from_parameter(format), &format, |b, &format| {
            b.iter(|| {
                let mut writer =
                    RecordWriter::new(Vec::with_capacity(4 << 20), format, RecordKind::Trades)
                        .expect("header write");
                for record in &records {
                    writer.write(record).expect("record write");
                }
                writer.finish().expect("flush")
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    cursor_benchmark,
    last_id_benchmark,
    windows_benchmark,
    writer_benchmark
);
criterion_main!(benches);
