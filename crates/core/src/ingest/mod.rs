pub mod frame;
pub mod http_json;
pub mod yahoo;

use crate::config::Settings;
use crate::domain::price::PriceBar;
use chrono::{Months, NaiveDate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ATTEMPTS: u32 = 1;
const MAX_BACKOFF_SHIFT: u32 = 5;

/// How much history to request, ending at the market date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Months(u32),
    Since(NaiveDate),
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::Months(6)
    }
}

impl Lookback {
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        match *self {
            Lookback::Months(n) => today
                .checked_sub_months(Months::new(n))
                .unwrap_or(NaiveDate::MIN),
            Lookback::Since(start) => start.min(today),
        }
    }
}

/// Per-ticker fetch failure. Never fatal to a ranking run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("provider HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::RateLimited => true,
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::UnknownTicker(_) | FetchError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily bars for `ticker` over `[lookback.start_date(today), today]`, ascending.
    /// An empty vector means the provider has no data for the window.
    async fn fetch_bars(
        &self,
        ticker: &str,
        lookback: Lookback,
        today: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Total attempts per ticker; only transient failures are retried.
    pub attempts: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl FetchOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(secs) = std::env::var("PRICE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            out.timeout = Duration::from_secs(secs);
        }

        if let Some(n) = std::env::var("PRICE_PROVIDER_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            out.attempts = n.max(1);
        }

        out
    }
}

pub fn build_price_source(settings: &Settings) -> anyhow::Result<Arc<dyn PriceSource>> {
    let opts = FetchOptions::from_env();
    match settings.price_provider.as_deref().unwrap_or("yahoo") {
        "yahoo" => Ok(Arc::new(yahoo::YahooChartSource::from_settings(settings, opts)?)),
        "http_json" => Ok(Arc::new(http_json::HttpJsonPriceSource::from_settings(
            settings, opts,
        )?)),
        other => anyhow::bail!("unsupported PRICE_PROVIDER: {other} (expected yahoo or http_json)"),
    }
}

pub(crate) async fn with_attempts<F, Fut>(
    attempts: u32,
    ticker: &str,
    mut op: F,
) -> Result<Vec<PriceBar>, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<PriceBar>, FetchError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(bars) => return Ok(bars),
            Err(err) if err.is_transient() && attempt < attempts => {
                let backoff = Duration::from_secs(1 << (attempt - 1).min(MAX_BACKOFF_SHIFT));
                tracing::warn!(attempt, ?backoff, %ticker, error = %err, "price fetch failed; retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}
