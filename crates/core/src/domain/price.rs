use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading session for a ticker. Series are ordered ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    pub fn has_finite_prices(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// A bar plus the rolling features derived from its trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub bar: PriceBar,
    pub log_return: f64,
    /// Sample stddev (ddof=1) of the trailing `window` log returns.
    pub volatility: f64,
    /// `close[t] / close[t - window] - 1`.
    pub momentum: f64,
}
