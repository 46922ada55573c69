//! Accounts command implementation.
//!
//! This module shows the configured accounts with redacted credentials, so
//! a config file can be sanity-checked without exposing secrets.

use anyhow::{Context, Result};
use std::path::Path;
use zonda_lib::prelude::*;
use zonda_lib::redact_value;

/// List configured accounts, optionally for a single exchange.
pub(crate) fn list_accounts(config_path: &Path, exchange: Option<&str>) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    let mut total = 0usize;

    println!(
        "{:<15} {:<20} {:<20} {:<15} {}",
        "EXCHANGE", "ACCOUNT", "TYPE", "API KEY", "ENABLED"
    );
    println!("{}", "-".repeat(80));

    for (name, section) in &config.exchanges {
        if exchange.is_some_and(|wanted| wanted != name) {
            continue;
        }
        for account in &section.accounts {
            println!(
                "{:<15} {:<20} {:<20} {:<15} {}",
                name,
                account.name,
                account.account_type,
                redact_value(&account.api_key),
                section.enabled
            );
            total += 1;
        }
    }

    println!("\nTotal: {total} accounts");
    Ok(())
}
