use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NO_DATA_MESSAGE: &str = "No data available";

// Minute precision, in the market's local time.
const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub ticker: String,
    pub score: f64,
    pub rank: u32,
    pub percentile: f64,
}

/// Result of one ranking pass. `Empty` is kept distinct from a zero-length list so
/// percentile computation is never attempted without entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Ranking {
    Empty,
    Ranked(Vec<ScoreEntry>),
}

impl Ranking {
    pub fn entries(&self) -> &[ScoreEntry] {
        match self {
            Ranking::Empty => &[],
            Ranking::Ranked(entries) => entries,
        }
    }

    pub fn total_count(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Ranking::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData { bars: usize },
    FetchFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTicker {
    pub ticker: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// One immutable ranking computation. Held by the daily cache until the market date
/// rolls over.
#[derive(Debug, Clone)]
pub struct RankingSnapshot {
    pub run_id: Uuid,
    pub as_of_date: NaiveDate,
    pub computed_at: DateTime<FixedOffset>,
    pub ranking: Ranking,
    pub skipped: Vec<SkippedTicker>,
}

impl RankingSnapshot {
    pub fn total_count(&self) -> usize {
        self.ranking.total_count()
    }

    pub fn last_updated(&self) -> String {
        self.computed_at.format(LAST_UPDATED_FORMAT).to_string()
    }
}

/// JSON envelope served by `GET /rank`. An empty ranking is a semantic error inside a
/// successful response, never an HTTP error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RankResponse {
    Success {
        last_updated: String,
        total_stocks: usize,
        ranking: Vec<ScoreEntry>,
    },
    Error {
        message: String,
        ranking: Vec<ScoreEntry>,
    },
}

impl From<&RankingSnapshot> for RankResponse {
    fn from(snapshot: &RankingSnapshot) -> Self {
        match &snapshot.ranking {
            Ranking::Empty => RankResponse::Error {
                message: NO_DATA_MESSAGE.to_string(),
                ranking: Vec::new(),
            },
            Ranking::Ranked(entries) => RankResponse::Success {
                last_updated: snapshot.last_updated(),
                total_stocks: entries.len(),
                ranking: entries.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn snapshot(ranking: Ranking) -> RankingSnapshot {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        RankingSnapshot {
            run_id: Uuid::nil(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            computed_at: ist.with_ymd_and_hms(2026, 3, 2, 9, 41, 37).unwrap(),
            ranking,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn success_envelope_matches_wire_shape() {
        let snap = snapshot(Ranking::Ranked(vec![ScoreEntry {
            ticker: "TCS.NS".to_string(),
            score: 0.115201,
            rank: 1,
            percentile: 100.0,
        }]));

        let v = serde_json::to_value(RankResponse::from(&snap)).unwrap();
        assert_eq!(
            v,
            json!({
                "status": "success",
                "last_updated": "2026-03-02 09:41",
                "total_stocks": 1,
                "ranking": [
                    {"ticker": "TCS.NS", "score": 0.115201, "rank": 1, "percentile": 100.0}
                ]
            })
        );
    }

    #[test]
    fn empty_ranking_serializes_as_error_payload() {
        let v = serde_json::to_value(RankResponse::from(&snapshot(Ranking::Empty))).unwrap();
        assert_eq!(
            v,
            json!({"status": "error", "message": "No data available", "ranking": []})
        );
    }

    #[test]
    fn skipped_ticker_flattens_reason() {
        let skipped = SkippedTicker {
            ticker: "UPL.NS".to_string(),
            reason: SkipReason::InsufficientData { bars: 12 },
        };
        let v = serde_json::to_value(&skipped).unwrap();
        assert_eq!(
            v,
            json!({"ticker": "UPL.NS", "reason": "insufficient_data", "bars": 12})
        );
    }
}
