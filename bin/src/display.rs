//! Display utilities and output formatting for the zonda CLI.

use clap::ValueEnum;
use zonda_lib::prelude::*;

/// Output format for exported records.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum Format {
    Csv,
    Ndjson,
}

impl Format {
    /// Returns the file extension for this format.
    pub(crate) const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Ndjson => "ndjson",
        }
    }
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => Self::Csv,
            Format::Ndjson => Self::Ndjson,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Record kind selectable on the command line.
#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum DataType {
    Trades,
    Funding,
    Deposits,
    Withdrawals,
    Fees,
}

impl From<DataType> for RecordKind {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Trades => Self::Trades,
            DataType::Funding => Self::Funding,
            DataType::Deposits => Self::Deposits,
            DataType::Withdrawals => Self::Withdrawals,
            DataType::Fees => Self::Fees,
        }
    }
}

/// Print the per-unit session summary and return (succeeded, failed) counts.
pub(crate) fn print_summary(reports: &[UnitReport]) -> (usize, usize) {
    let succeeded = reports.iter().filter(|report| report.is_ok()).count();
    let failed = reports.len() - succeeded;

    println!();
    println!("{:<6} {:<40} {}", "", "UNIT", "RESULT");
    println!("{}", "-".repeat(70));

    for report in reports {
        match &report.outcome {
            UnitOutcome::Completed { records } => {
                println!("{:<6} {:<40} {} records", "OK", report.unit, records);
            }
            UnitOutcome::Failed { error } => {
                println!("{:<6} {:<40} {}", "FAIL", report.unit, error);
            }
        }
    }

    println!("{}", "-".repeat(70));
    println!("{succeeded} succeeded, {failed} failed");

    (succeeded, failed)
}
