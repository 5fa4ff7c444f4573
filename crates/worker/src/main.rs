use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nifty_alpha_core::cache::DailyCache;
use nifty_alpha_core::config::Settings;
use nifty_alpha_core::domain::ranking::{RankResponse, SkipReason};
use nifty_alpha_core::ranking::{EngineConfig, RankingEngine};
use nifty_alpha_core::time::market::{MarketTime, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "nifty_alpha_worker")]
struct Args {
    /// Rank only the first N tickers of the universe.
    #[arg(long)]
    limit: Option<usize>,

    /// Pretty-print the JSON payload.
    #[arg(long)]
    pretty: bool,

    /// Exit non-zero when no ticker could be ranked.
    #[arg(long)]
    fail_on_empty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, &args).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "ranking run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Some(limit) = args.limit {
        anyhow::ensure!(limit >= 1, "--limit must be >= 1");
        config.universe.truncate(limit);
    }

    let source = nifty_alpha_core::ingest::build_price_source(settings)?;
    let engine = RankingEngine::new(source, config);
    let cache = DailyCache::new(engine, Arc::new(SystemClock), MarketTime::from_env()?);

    let snapshot = cache.get().await;

    for skipped in &snapshot.skipped {
        match &skipped.reason {
            SkipReason::FetchFailed { error } => {
                tracing::info!(ticker = %skipped.ticker, %error, "skipped: fetch failed")
            }
            SkipReason::InsufficientData { bars } => {
                tracing::info!(ticker = %skipped.ticker, bars, "skipped: insufficient data")
            }
        }
    }

    let payload = RankResponse::from(snapshot.as_ref());
    let out = if args.pretty {
        serde_json::to_string_pretty(&payload)?
    } else {
        serde_json::to_string(&payload)?
    };
    println!("{out}");

    tracing::info!(
        run_id = %snapshot.run_id,
        as_of_date = %snapshot.as_of_date,
        ranked = snapshot.total_count(),
        skipped = snapshot.skipped.len(),
        "worker run complete"
    );

    if args.fail_on_empty {
        anyhow::ensure!(
            !snapshot.ranking.is_empty(),
            "no ticker produced a score for {}",
            snapshot.as_of_date
        );
    }

    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
