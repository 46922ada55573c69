//! Retrying HTTP request execution guarded by the rate limiter.

use reqwest::header::HeaderMap;
use reqwest::{Client, Proxy, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::rate_limit::{RateLimitState, RateLimitUpdate, RateLimiter};
use crate::redact::redact_params;

/// Status codes retried like transport failures (429 has its own handling).
const RETRYABLE_STATUS: &[u16] = &[500, 502, 503, 504];

/// Cap on the backoff exponent, to keep the shift well-defined.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Configuration for the request executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum retry attempts after the initial try.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// One exponential backoff unit.
    pub backoff_unit: Duration,
    /// Proxy URL for all requests, if any.
    pub proxy: Option<String>,
    /// User agent string.
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
            backoff_unit: Duration::from_secs(1),
            proxy: None,
            user_agent: format!("zonda/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Errors from executing a request against an exchange API.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Request could not be built (bad URL or parameters).
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] reqwest::Error),

    /// Network-level failure that survived every retry.
    #[error("transport error after {attempts} attempts: {source}")]
    Transport {
        /// Total tries made, including the initial one.
        attempts: u32,
        /// The final transport error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP 429 that survived the retry budget and the grace retry.
    #[error("rate limited (HTTP 429) after {attempts} attempts")]
    RateLimited {
        /// Total tries made, including the initial one.
        attempts: u32,
    },

    /// Retryable HTTP 5xx that survived every retry, or an unexpected
    /// non-retryable server status.
    #[error("server error (HTTP {status}) after {attempts} attempts")]
    Server {
        /// The final HTTP status code.
        status: u16,
        /// Total tries made, including the initial one.
        attempts: u32,
    },

    /// Client error other than 429; surfaced immediately, never retried.
    #[error("auth or client error (HTTP {status}): {body}")]
    Auth {
        /// The HTTP status code.
        status: u16,
        /// Response body, for the venue's error code and message.
        body: String,
    },

    /// Successful response whose body was not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Response-header names carrying quota metadata for one venue.
///
/// The names belong to the exchange adapter; the executor only runs the
/// extraction and hands the numeric values to the rate limiter.
#[derive(Debug, Clone, Default)]
pub struct RateLimitHeaders {
    /// Headers carrying consumed weight, probed in order.
    pub used_weight: Vec<String>,
    /// Header carrying the remaining request count.
    pub remaining: Option<String>,
    /// Header carrying seconds until the quota window resets.
    pub reset_after: Option<String>,
}

impl RateLimitHeaders {
    /// Pulls quota metadata out of a response header map.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> RateLimitUpdate {
        RateLimitUpdate {
            used_weight: self
                .used_weight
                .iter()
                .find_map(|name| header_value(headers, name)),
            remaining: self
                .remaining
                .as_deref()
                .and_then(|name| header_value(headers, name)),
            reset_after_secs: self
                .reset_after
                .as_deref()
                .and_then(|name| header_value(headers, name)),
        }
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Executes GET requests with bounded retries, exponential backoff, and
/// rate-limit bookkeeping.
///
/// One executor exists per (exchange, account) pairing. Its limiter lock is
/// held for the whole attempt cycle, so requests through one executor stay
/// strictly sequential relative to that account's quota state.
#[derive(Debug)]
pub struct RequestExecutor {
    client: Client,
    config: ExecutorConfig,
    limiter: Mutex<RateLimiter>,
    rate_limit_headers: RateLimitHeaders,
}

impl RequestExecutor {
    /// Creates an executor around a pooled HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created, including an
    /// unparseable proxy URL.
    pub fn new(
        config: ExecutorConfig,
        limiter: RateLimiter,
        rate_limit_headers: RateLimitHeaders,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .gzip(true);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            config,
            limiter: Mutex::new(limiter),
            rate_limit_headers,
        })
    }

    /// Returns the executor configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Snapshot of the account's current quota state.
    pub async fn rate_limit_state(&self) -> RateLimitState {
        self.limiter.lock().await.state().clone()
    }

    /// Executes a GET request, returning the decoded JSON body.
    ///
    /// Before every attempt the limiter's cooldown is awaited; after every
    /// response the limiter is fed the quota metadata the header profile
    /// extracts. Transport failures and HTTP 429/500/502/503/504 are retried
    /// up to the configured budget with a countdown backoff schedule; a final
    /// 429 gets one extra grace retry. Other client errors fail immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] classifying the failure once retries are
    /// exhausted (or immediately, for non-retryable statuses).
    pub async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<Value, FetchError> {
        let mut limiter = self.limiter.lock().await;

        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;
        let mut grace_used = false;

        loop {
            limiter.await_ready().await;

            let mut builder = self.client.get(url).headers(headers.clone());
            if !params.is_empty() {
                builder = builder.query(params);
            }
            let request = builder.build().map_err(FetchError::InvalidRequest)?;

            attempt += 1;
            debug!(url, params = ?redact_params(params), attempt, "sending request");

            match self.client.execute(request).await {
                Ok(response) => {
                    limiter.observe(self.rate_limit_headers.extract(response.headers()));
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(FetchError::Decode);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt <= max_retries {
                            let delay = self.backoff_delay(attempt);
                            warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        if !grace_used {
                            grace_used = true;
                            let delay = self.grace_delay();
                            warn!(delay_ms = delay.as_millis() as u64, "retry budget exhausted on 429, taking one grace retry");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(FetchError::RateLimited { attempts: attempt });
                    }

                    if RETRYABLE_STATUS.contains(&status.as_u16()) {
                        if attempt <= max_retries {
                            let delay = self.backoff_delay(attempt);
                            warn!(status = status.as_u16(), attempt, delay_ms = delay.as_millis() as u64, "server error, backing off");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(FetchError::Server {
                            status: status.as_u16(),
                            attempts: attempt,
                        });
                    }

                    if status.is_client_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(status = status.as_u16(), "client error, not retrying");
                        return Err(FetchError::Auth {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    // Stray non-retryable status (3xx that slipped redirect
                    // handling, or an exotic 5xx).
                    return Err(FetchError::Server {
                        status: status.as_u16(),
                        attempts: attempt,
                    });
                }
                Err(error) if is_retryable_error(&error) && attempt <= max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(%error, attempt, delay_ms = delay.as_millis() as u64, "transport error, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(FetchError::Transport {
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    /// Backoff delay before retrying the given failed attempt (1-based).
    ///
    /// The schedule counts down: the first retry waits `2^max_retries`
    /// units and the last waits 2, so waits shrink as the budget runs out.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = self
            .config
            .max_retries
            .saturating_sub(attempt)
            .saturating_add(1)
            .min(MAX_BACKOFF_EXPONENT);
        self.config.backoff_unit.saturating_mul(1 << exponent)
    }

    /// Delay for the single grace retry after a final 429.
    fn grace_delay(&self) -> Duration {
        let exponent = self.config.max_retries.min(MAX_BACKOFF_EXPONENT);
        self.config.backoff_unit.saturating_mul(1 << exponent)
    }
}

/// Determines if a transport error is worth retrying.
fn is_retryable_error(error: &reqwest::Error) -> bool {
    // Builder errors are configuration issues; retrying cannot help.
    if error.is_builder() {
        return false;
    }
    error.is_timeout() || error.is_connect() || error.is_request()
}
