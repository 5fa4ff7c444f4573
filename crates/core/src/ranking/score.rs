use crate::domain::price::FeatureRow;
use crate::domain::ranking::{Ranking, ScoreEntry};

const SCORE_DECIMALS: i32 = 6;
const PERCENTILE_DECIMALS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Reward per unit of trailing momentum.
    pub momentum: f64,
    /// Penalty per unit of trailing volatility.
    pub volatility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            momentum: 0.6,
            volatility: 0.4,
        }
    }
}

impl ScoreWeights {
    /// `momentum * w_m - volatility * w_v`, rounded to 6 decimals. `None` if the
    /// result is not finite.
    pub fn score(&self, row: &FeatureRow) -> Option<f64> {
        let raw = row.momentum * self.momentum - row.volatility * self.volatility;
        let rounded = round_to(raw, SCORE_DECIMALS);
        rounded.is_finite().then_some(rounded)
    }
}

/// Rounds to `decimals` places, halves to even.
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round_ties_even() / scale
}

/// Sorts by score descending and assigns dense 1-based ranks and percentiles.
///
/// The sort is stable, so equal scores keep their input order (universe order).
pub fn rank_scores(mut scored: Vec<(String, f64)>) -> Ranking {
    if scored.is_empty() {
        return Ranking::Empty;
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let n = scored.len() as f64;
    let entries = scored
        .into_iter()
        .enumerate()
        .map(|(i, (ticker, score))| ScoreEntry {
            ticker,
            score,
            rank: (i + 1) as u32,
            percentile: round_to(100.0 * (1.0 - i as f64 / n), PERCENTILE_DECIMALS),
        })
        .collect();

    Ranking::Ranked(entries)
}
