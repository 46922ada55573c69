//! Export command implementation.
//!
//! This module plans a fetch session from the CLI arguments, streams every
//! unit through the exporter, and prints a per-unit summary.

use crate::display::{DataType, Format, print_summary};
use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use zonda_lib::prelude::*;

/// Fetch account history and write one file per exchange/account/kind unit.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn export(
    exchanges: Vec<String>,
    accounts: Vec<String>,
    data_types: &[DataType],
    start_str: &str,
    end_str: &str,
    symbols: Vec<String>,
    output_dir: PathBuf,
    format: Format,
    overlap_ms: i64,
    concurrency: usize,
    config_path: &Path,
    quiet: bool,
) -> Result<ExitCode> {
    let start =
        parse_time(start_str).with_context(|| format!("Invalid start time: {start_str}"))?;
    let end = parse_time(end_str).with_context(|| format!("Invalid end time: {end_str}"))?;
    let range = TimeRange::new(start, end)?;

    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    let mut plan = FetchPlan::new(range);
    plan.exchanges = exchanges;
    plan.accounts = if accounts.is_empty() {
        None
    } else {
        Some(accounts)
    };
    plan.kinds = data_types.iter().copied().map(RecordKind::from).collect();
    plan.symbols = if symbols.is_empty() {
        None
    } else {
        Some(symbols)
    };
    plan.window_overlap = TimeDelta::milliseconds(overlap_ms);
    plan.concurrency = concurrency;

    // Setup progress bar
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(planned_units(&config, &plan));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units {msg}",
                )
                .expect("Invalid progress template")
                .progress_chars("=>-"),
        );
        pb.set_message(format!("{} -> {}", range.start.date_naive(), range.end.date_naive()));
        pb
    };

    let exporter = Exporter::new(&output_dir, ExportFormat::from(format));
    let registry = AdapterRegistry::global();

    let consume = |unit: FetchUnit, records: RecordStream| {
        let exporter = exporter.clone();
        let progress = progress.clone();
        async move {
            progress.set_message(unit.to_string());
            let count = exporter
                .export_unit(
                    &unit.exchange,
                    &unit.account,
                    unit.kind,
                    &range,
                    records.map_err(anyhow::Error::from),
                )
                .await?;
            progress.inc(1);
            Ok::<u64, anyhow::Error>(count)
        }
    };

    let reports = tokio::select! {
        reports = run_session(registry, &config, &plan, consume) => reports?,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    };

    progress.finish_and_clear();

    let (succeeded, failed) = print_summary(&reports);
    if !quiet {
        println!("Output written to: {}", output_dir.display());
    }

    // All units failed is a harder failure than a partial one
    Ok(if failed > 0 && succeeded == 0 {
        ExitCode::from(2)
    } else if failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// Number of units the session will run, for progress tracking.
fn planned_units(config: &Config, plan: &FetchPlan) -> u64 {
    let accounts: usize = config
        .enabled_exchanges()
        .filter(|(name, _)| {
            plan.exchanges.is_empty() || plan.exchanges.iter().any(|wanted| wanted == name)
        })
        .map(|(_, exchange)| {
            exchange
                .accounts
                .iter()
                .filter(|account| {
                    plan.accounts
                        .as_ref()
                        .is_none_or(|filter| filter.iter().any(|name| name == &account.name))
                })
                .count()
        })
        .sum();
    (accounts * plan.kinds.len()) as u64
}
