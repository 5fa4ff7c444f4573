//! Yahoo Finance v8 chart source.
//!
//! Prices are auto-adjusted: when the response carries an adjusted close, the
//! whole OHLC bar is scaled by `adjclose / close` so splits and dividends do not
//! show up as returns.

use crate::config::Settings;
use crate::domain::price::PriceBar;
use crate::ingest::{with_attempts, FetchError, FetchOptions, Lookback, PriceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct YahooChartSource {
    http: reqwest::Client,
    base_url: String,
    attempts: u32,
}

impl YahooChartSource {
    pub fn from_settings(settings: &Settings, opts: FetchOptions) -> Result<Self> {
        let base_url = settings
            .price_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build yahoo http client")?;

        Ok(Self {
            http,
            base_url,
            attempts: opts.attempts,
        })
    }

    fn chart_url(&self, ticker: &str) -> String {
        format!(
            "{}/v8/finance/chart/{ticker}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn fetch_once(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = (end + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let res = self
            .http
            .get(self.chart_url(ticker))
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("includeAdjustedClose", "true".to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        parse_chart_body(ticker, status, text)
    }
}

/// Maps a raw chart response to bars or a typed error.
///
/// Yahoo reports unknown symbols as a 404 with a JSON error body, so the body is
/// parsed before the status is judged.
fn parse_chart_body(
    ticker: &str,
    status: StatusCode,
    text: String,
) -> Result<Vec<PriceBar>, FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }

    match serde_json::from_str::<ChartResponse>(&text) {
        Ok(chart) => parse_chart(ticker, chart),
        Err(_) if !status.is_success() => Err(FetchError::Http {
            status: status.as_u16(),
            body: text,
        }),
        Err(e) => Err(FetchError::Malformed(format!("chart for {ticker}: {e}"))),
    }
}

#[async_trait::async_trait]
impl PriceSource for YahooChartSource {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_bars(
        &self,
        ticker: &str,
        lookback: Lookback,
        today: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let start = lookback.start_date(today);
        with_attempts(self.attempts, ticker, || self.fetch_once(ticker, start, today)).await
    }
}

fn parse_chart(ticker: &str, resp: ChartResponse) -> Result<Vec<PriceBar>, FetchError> {
    if let Some(err) = resp.chart.error {
        if err.code.eq_ignore_ascii_case("Not Found") {
            return Err(FetchError::UnknownTicker(ticker.to_string()));
        }
        return Err(FetchError::Malformed(format!(
            "{}: {}",
            err.code, err.description
        )));
    }

    let Some(data) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let Some(timestamps) = data.timestamp else {
        return Ok(Vec::new());
    };

    let gmtoffset = data.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut bars: Vec<PriceBar> = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        // Session timestamps are in UTC; shift to exchange time before taking the date.
        let date = DateTime::from_timestamp(ts + gmtoffset, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| FetchError::Malformed(format!("invalid timestamp: {ts}")))?;

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        let adj_close = adj_closes
            .as_ref()
            .and_then(|v| v.get(i).copied().flatten());
        let factor = match (adj_close, close) {
            (Some(adj), Some(c)) if c != 0.0 && adj.is_finite() => adj / c,
            _ => 1.0,
        };

        let bar = PriceBar {
            date,
            open: open.unwrap_or(f64::NAN) * factor,
            high: high.unwrap_or(f64::NAN) * factor,
            low: low.unwrap_or(f64::NAN) * factor,
            close: close.unwrap_or(f64::NAN) * factor,
            volume: volume.unwrap_or(0),
        };

        // A live session can be reported twice; keep the latest print.
        match bars.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => bars.push(bar),
        }
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
