//! Error types for exchange adapters and fetch sessions.

use thiserror::Error;
use zonda_fetch::FetchError;
use zonda_types::TimeRangeError;

/// Errors that abort one fetch unit (or, for plan validation, the session).
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// No adapter is registered under the requested exchange id.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// The exchange has no section in the loaded configuration.
    #[error("exchange {0} is not configured")]
    NotConfigured(String),

    /// The account config lacks a credential this exchange requires.
    #[error("account {account} is missing required credential `{field}`")]
    MissingCredential {
        /// Account name from the config.
        account: String,
        /// Name of the missing config field.
        field: &'static str,
    },

    /// A credential contains bytes that cannot be sent as an HTTP header.
    #[error("credentials for account {account} contain invalid header characters")]
    InvalidCredential {
        /// Account name from the config.
        account: String,
    },

    /// The requested time range cannot be windowed.
    #[error(transparent)]
    Range(#[from] TimeRangeError),

    /// The request pipeline failed after retries.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The venue answered with a payload shape the adapter cannot read, or
    /// an application-level error code inside an HTTP 200.
    #[error("unexpected response: {0}")]
    Response(String),
}
