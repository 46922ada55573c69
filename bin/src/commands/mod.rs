//! CLI command implementations.

pub(crate) mod accounts;
pub(crate) mod exchanges;
pub(crate) mod export;
