use crate::domain::price::{FeatureRow, PriceBar};
use crate::domain::ranking::{RankingSnapshot, SkipReason, SkippedTicker};
use crate::features::latest_features;
use crate::ingest::{FetchError, PriceSource};
use crate::ranking::config::EngineConfig;
use crate::ranking::score::rank_scores;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PROGRESS_EVERY: usize = 10;
const MAX_LOGGED_FAILURES: usize = 10;

/// What happened to one ticker during a ranking run.
#[derive(Debug)]
pub enum TickerOutcome {
    Scored {
        ticker: String,
        score: f64,
        latest: FeatureRow,
    },
    InsufficientData {
        ticker: String,
        bars: usize,
    },
    Failed {
        ticker: String,
        error: FetchError,
    },
}

impl TickerOutcome {
    pub fn ticker(&self) -> &str {
        match self {
            TickerOutcome::Scored { ticker, .. }
            | TickerOutcome::InsufficientData { ticker, .. }
            | TickerOutcome::Failed { ticker, .. } => ticker,
        }
    }
}

pub struct RankingEngine {
    source: Arc<dyn PriceSource>,
    config: EngineConfig,
}

impl RankingEngine {
    pub fn new(source: Arc<dyn PriceSource>, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &'static str {
        self.source.provider_name()
    }

    /// Scores an already-fetched series. Pure; no I/O.
    pub fn score_series(&self, ticker: &str, bars: &[PriceBar]) -> TickerOutcome {
        let insufficient = || TickerOutcome::InsufficientData {
            ticker: ticker.to_string(),
            bars: bars.len(),
        };

        if bars.len() < self.config.min_history {
            return insufficient();
        }

        let Some(latest) = latest_features(bars, self.config.window) else {
            return insufficient();
        };
        let Some(score) = self.config.weights.score(&latest) else {
            return insufficient();
        };

        TickerOutcome::Scored {
            ticker: ticker.to_string(),
            score,
            latest,
        }
    }

    pub async fn evaluate(&self, ticker: &str, today: NaiveDate) -> TickerOutcome {
        match self
            .source
            .fetch_bars(ticker, self.config.lookback, today)
            .await
        {
            Ok(bars) => self.score_series(ticker, &bars),
            Err(error) => TickerOutcome::Failed {
                ticker: ticker.to_string(),
                error,
            },
        }
    }

    /// Full sequential pass over the universe. Never fails: every per-ticker problem is
    /// recorded on the snapshot's skipped list.
    pub async fn run(&self, computed_at: DateTime<FixedOffset>) -> RankingSnapshot {
        let run_id = Uuid::new_v4();
        let as_of_date = computed_at.date_naive();
        let total = self.config.universe.len();
        let progress_every = std::env::var("RANK_PROGRESS_EVERY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PROGRESS_EVERY);

        tracing::info!(
            %run_id,
            %as_of_date,
            total,
            provider = self.provider_name(),
            "recomputing ranking"
        );

        let mut scored: Vec<(String, f64)> = Vec::with_capacity(total);
        let mut skipped: Vec<SkippedTicker> = Vec::new();
        let mut failures: usize = 0;

        for (idx, ticker) in self.config.universe.iter().enumerate() {
            match self.evaluate(ticker, as_of_date).await {
                TickerOutcome::Scored { ticker, score, latest } => {
                    tracing::debug!(
                        %run_id,
                        %ticker,
                        score,
                        momentum = latest.momentum,
                        volatility = latest.volatility,
                        bar_date = %latest.bar.date,
                        "ticker scored"
                    );
                    scored.push((ticker, score));
                }
                TickerOutcome::InsufficientData { ticker, bars } => {
                    tracing::debug!(%run_id, %ticker, bars, "insufficient history; skipping ticker");
                    skipped.push(SkippedTicker {
                        ticker,
                        reason: SkipReason::InsufficientData { bars },
                    });
                }
                TickerOutcome::Failed { ticker, error } => {
                    failures += 1;
                    if failures <= MAX_LOGGED_FAILURES {
                        tracing::warn!(
                            %run_id,
                            idx,
                            %ticker,
                            failure_count = failures,
                            error = %error,
                            "price fetch failed; skipping ticker"
                        );
                    }
                    skipped.push(SkippedTicker {
                        ticker,
                        reason: SkipReason::FetchFailed {
                            error: error.to_string(),
                        },
                    });
                }
            }

            if progress_every != 0 {
                let n = idx + 1;
                if n == total || n % progress_every == 0 {
                    tracing::info!(
                        %run_id,
                        processed = n,
                        total,
                        scored = scored.len(),
                        failures,
                        "ranking progress"
                    );
                }
            }
        }

        let ranking = rank_scores(scored);
        let ranked = ranking.total_count();
        if ranking.is_empty() {
            tracing::error!(%run_id, %as_of_date, total, failures, "no ticker produced a score");
        } else {
            tracing::info!(
                %run_id,
                %as_of_date,
                ranked,
                insufficient = skipped.len() - failures,
                failures,
                "ranking computed"
            );
        }

        RankingSnapshot {
            run_id,
            as_of_date,
            computed_at,
            ranking,
            skipped,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ranking::Ranking;
    use crate::features::tests::bars_from_closes;
    use crate::ingest::frame::SplitFrame;
    use crate::ingest::Lookback;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source: known tickers return their series, anything else is unknown.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub series: HashMap<String, Vec<PriceBar>>,
        pub calls: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn with(mut self, ticker: &str, closes: &[f64]) -> Self {
            self.series
                .insert(ticker.to_string(), bars_from_closes(closes));
            self
        }
    }

    #[async_trait::async_trait]
    impl PriceSource for FakeSource {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_bars(
            &self,
            ticker: &str,
            _lookback: Lookback,
            _today: NaiveDate,
        ) -> Result<Vec<PriceBar>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.series
                .get(ticker)
                .cloned()
                .ok_or_else(|| FetchError::UnknownTicker(ticker.to_string()))
        }
    }

    pub(crate) fn trending(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
            .unwrap()
    }

    fn engine(source: FakeSource, universe: &[&str]) -> RankingEngine {
        let config = EngineConfig::default().with_universe(universe.iter().copied());
        RankingEngine::new(Arc::new(source), config)
    }

    #[test]
    fn short_series_is_insufficient_not_failed() {
        let e = engine(FakeSource::default(), &["A.NS"]);
        let outcome = e.score_series("A.NS", &bars_from_closes(&trending(39, 100.0, 1.0)));
        assert!(matches!(outcome, TickerOutcome::InsufficientData { bars: 39, .. }));

        let outcome = e.score_series("A.NS", &bars_from_closes(&trending(40, 100.0, 1.0)));
        assert!(matches!(outcome, TickerOutcome::Scored { .. }));
    }

    #[test]
    fn trailing_nan_bar_falls_back_to_last_valid_row() {
        let e = engine(FakeSource::default(), &["A.NS"]);
        let mut closes = trending(60, 100.0, 1.0);
        closes[59] = f64::NAN;
        let outcome = e.score_series("A.NS", &bars_from_closes(&closes));
        assert!(matches!(outcome, TickerOutcome::Scored { .. }));

        // Falls back to bar 58. With every close missing nothing is left.
        let outcome = e.score_series("A.NS", &bars_from_closes(&[f64::NAN; 60]));
        assert!(matches!(outcome, TickerOutcome::InsufficientData { .. }));
    }

    #[test]
    fn close_only_frame_is_scored() {
        let closes = trending(60, 100.0, 1.0);
        let index: Vec<String> = bars_from_closes(&closes)
            .iter()
            .map(|b| b.date.to_string())
            .collect();
        let data: Vec<Vec<f64>> = closes.iter().map(|c| vec![*c]).collect();
        let frame: SplitFrame = serde_json::from_value(serde_json::json!({
            "columns": [["Close", "TCS.NS"]],
            "index": index,
            "data": data
        }))
        .unwrap();
        let bars = frame.into_bars("TCS.NS").unwrap();
        assert_eq!(bars.len(), 60);

        let e = engine(FakeSource::default(), &["TCS.NS"]);
        let outcome = e.score_series("TCS.NS", &bars);
        let expected = e.score_series("TCS.NS", &bars_from_closes(&closes));
        match (outcome, expected) {
            (
                TickerOutcome::Scored { score, .. },
                TickerOutcome::Scored { score: want, .. },
            ) => assert_eq!(score, want),
            other => panic!("expected both series to score, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_skips_failures_and_ranks_the_rest() {
        let source = FakeSource::default()
            .with("UP.NS", &trending(60, 100.0, 1.0))
            .with("DOWN.NS", &trending(60, 200.0, -1.0))
            .with("SHORT.NS", &trending(10, 100.0, 1.0));
        let e = engine(source, &["DOWN.NS", "MISSING.NS", "UP.NS", "SHORT.NS"]);

        let snap = e.run(now()).await;
        assert_eq!(snap.as_of_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(snap.total_count(), 2);

        let tickers: Vec<_> = snap.ranking.entries().iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, ["UP.NS", "DOWN.NS"]);

        assert_eq!(snap.skipped.len(), 2);
        assert_eq!(snap.skipped[0].ticker, "MISSING.NS");
        assert!(matches!(snap.skipped[0].reason, SkipReason::FetchFailed { .. }));
        assert_eq!(
            snap.skipped[1].reason,
            SkipReason::InsufficientData { bars: 10 }
        );
    }

    #[tokio::test]
    async fn run_with_every_fetch_failing_is_empty() {
        let e = engine(FakeSource::default(), &["A.NS", "B.NS", "C.NS"]);
        let snap = e.run(now()).await;
        assert_eq!(snap.ranking, Ranking::Empty);
        assert_eq!(snap.skipped.len(), 3);
    }

    #[tokio::test]
    async fn run_fetches_each_ticker_once() {
        let source = Arc::new(FakeSource::default().with("A.NS", &trending(60, 10.0, 0.1)));
        let config = EngineConfig::default().with_universe(["A.NS", "B.NS"]);
        let e = RankingEngine::new(source.clone(), config);

        e.run(now()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
