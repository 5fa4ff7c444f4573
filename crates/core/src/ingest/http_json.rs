use crate::config::Settings;
use crate::domain::price::PriceBar;
use crate::ingest::frame::SplitFrame;
use crate::ingest::{with_attempts, FetchError, FetchOptions, Lookback, PriceSource};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;

const DEFAULT_PATH: &str = "/v1/daily_bars";

/// Generic JSON price provider returning a column-split frame per ticker.
#[derive(Debug, Clone)]
pub struct HttpJsonPriceSource {
    http: reqwest::Client,
    base_url: String,
    path: String,
    attempts: u32,
}

impl HttpJsonPriceSource {
    pub fn from_settings(settings: &Settings, opts: FetchOptions) -> Result<Self> {
        let base_url = settings.require_price_provider_base_url()?.to_string();

        let path = std::env::var("PRICE_PROVIDER_BARS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &settings.price_provider_api_key {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(api_key).context("PRICE_PROVIDER_API_KEY is not a valid header value")?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(opts.timeout)
            .default_headers(headers)
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            path,
            attempts: opts.attempts,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_once(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let res = self
            .http
            .get(self.url())
            .query(&[
                ("ticker", ticker.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        parse_frame_body(ticker, status, &text)
    }
}

fn parse_frame_body(
    ticker: &str,
    status: StatusCode,
    text: &str,
) -> Result<Vec<PriceBar>, FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::UnknownTicker(ticker.to_string()));
    }
    if !status.is_success() {
        return Err(FetchError::Http {
            status: status.as_u16(),
            body: text.to_string(),
        });
    }

    let frame = serde_json::from_str::<SplitFrame>(text)
        .map_err(|e| FetchError::Malformed(format!("price frame for {ticker}: {e}")))?;
    frame.into_bars(ticker)
}

#[async_trait::async_trait]
impl PriceSource for HttpJsonPriceSource {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
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

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: Option<&str>) -> Settings {
        Settings {
            price_provider: Some("http_json".to_string()),
            price_provider_base_url: base_url.map(str::to_string),
            ..Settings::default()
        }
    }

    #[test]
    fn requires_base_url() {
        let res = HttpJsonPriceSource::from_settings(&settings(None), FetchOptions::default());
        assert!(res.is_err());
    }

    #[test]
    fn status_codes_map_to_fetch_errors() {
        assert!(matches!(
            parse_frame_body("TCS.NS", StatusCode::TOO_MANY_REQUESTS, ""),
            Err(FetchError::RateLimited)
        ));
        assert!(matches!(
            parse_frame_body("TCS.NS", StatusCode::NOT_FOUND, "{}"),
            Err(FetchError::UnknownTicker(t)) if t == "TCS.NS"
        ));
        assert!(matches!(
            parse_frame_body("TCS.NS", StatusCode::SERVICE_UNAVAILABLE, "maintenance"),
            Err(FetchError::Http { status: 503, ref body }) if body == "maintenance"
        ));
        assert!(matches!(
            parse_frame_body("TCS.NS", StatusCode::OK, "[]"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn ok_body_is_parsed_as_frame() {
        let body = r#"{"columns":["Close"],"index":["2026-02-02"],"data":[[3500.0]]}"#;
        let bars = parse_frame_body("TCS.NS", StatusCode::OK, body).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 3500.0);
    }

    #[test]
    fn joins_base_url_and_path() {
        let src = HttpJsonPriceSource::from_settings(
            &settings(Some("https://prices.example.com/")),
            FetchOptions::default(),
        )
        .unwrap();
        assert_eq!(src.url(), "https://prices.example.com/v1/daily_bars");
    }
}
