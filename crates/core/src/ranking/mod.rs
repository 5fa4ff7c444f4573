pub mod config;
pub mod engine;
pub mod score;

pub use config::EngineConfig;
pub use engine::{RankingEngine, TickerOutcome};
pub use score::{rank_scores, ScoreWeights};
