use crate::domain::universe;
use crate::ingest::Lookback;
use crate::ranking::score::ScoreWeights;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tickers in iteration order; ties in score keep this order.
    pub universe: Vec<String>,

    pub weights: ScoreWeights,

    /// Trailing sessions for volatility and momentum.
    pub window: usize,

    /// Series shorter than this are "insufficient data", not failures.
    pub min_history: usize,

    pub lookback: Lookback,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            universe: universe::nifty_50(),
            weights: ScoreWeights::default(),
            window: 20,
            min_history: 40,
            lookback: Lookback::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with tunables overridden from the environment. The universe is fixed.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        if let Some(n) = env_parse::<usize>("RANK_WINDOW") {
            out.window = n;
        }
        if let Some(n) = env_parse::<usize>("RANK_MIN_HISTORY") {
            out.min_history = n;
        }
        if let Some(w) = env_parse::<f64>("RANK_WEIGHT_MOMENTUM") {
            out.weights.momentum = w;
        }
        if let Some(w) = env_parse::<f64>("RANK_WEIGHT_VOLATILITY") {
            out.weights.volatility = w;
        }
        if let Some(n) = env_parse::<u32>("RANK_LOOKBACK_MONTHS") {
            out.lookback = Lookback::Months(n);
        }

        out.validate()?;
        Ok(out)
    }

    pub fn with_universe<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.universe = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.window >= 2, "RANK_WINDOW must be >= 2 (got {})", self.window);
        anyhow::ensure!(
            self.min_history > self.window,
            "RANK_MIN_HISTORY must exceed RANK_WINDOW ({} <= {})",
            self.min_history,
            self.window
        );
        anyhow::ensure!(
            self.weights.momentum.is_finite() && self.weights.volatility.is_finite(),
            "score weights must be finite"
        );
        anyhow::ensure!(!self.universe.is_empty(), "universe must be non-empty");
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
