//! Exchanges command implementation.
//!
//! This module lists the exchanges with a built-in adapter.

use zonda_lib::prelude::*;

/// List the supported exchange ids.
pub(crate) fn list_exchanges() {
    let registry = AdapterRegistry::global();
    let ids: Vec<_> = registry.ids().collect();

    println!("{:<15}", "EXCHANGE");
    println!("{}", "-".repeat(15));

    for id in &ids {
        println!("{id:<15}");
    }

    println!("\nTotal: {} exchanges", ids.len());
}
