use anyhow::Context;
use axum::{
    extract::State,
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nifty_alpha_core::cache::DailyCache;
use nifty_alpha_core::config::Settings;
use nifty_alpha_core::domain::ranking::RankResponse;
use nifty_alpha_core::domain::universe::ENGINE_NAME;
use nifty_alpha_core::ranking::{EngineConfig, RankingEngine};
use nifty_alpha_core::time::market::{MarketTime, SystemClock};

const DEFAULT_CORS_ORIGIN: &str = "https://clickneeth.github.io";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let (state, cors) = match build_state(&settings) {
        Ok(v) => v,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "failed to configure ranking engine");
            return Err(e);
        }
    };

    let app = build_router(state, cors);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    cache: Arc<DailyCache>,
}

fn build_state(settings: &Settings) -> anyhow::Result<(AppState, CorsLayer)> {
    let source = nifty_alpha_core::ingest::build_price_source(settings)?;
    let config = EngineConfig::from_env()?;
    let market = MarketTime::from_env()?;

    tracing::info!(
        provider = source.provider_name(),
        universe = config.universe.len(),
        window = config.window,
        market_offset = %market.offset(),
        "ranking engine configured"
    );

    let engine = RankingEngine::new(source, config);
    let cache = DailyCache::new(engine, Arc::new(SystemClock), market);
    let cors = cors_layer(settings)?;

    Ok((
        AppState {
            cache: Arc::new(cache),
        },
        cors,
    ))
}

fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/rank", get(rank))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(settings: &Settings) -> anyhow::Result<CorsLayer> {
    let origins = settings
        .cors_allow_origins
        .as_deref()
        .unwrap_or(DEFAULT_CORS_ORIGIN)
        .trim();

    let base = CorsLayer::new().allow_methods([Method::GET]);

    // Browsers reject credentials with a wildcard origin, so the permissive variant
    // never sends them.
    if origins == "*" {
        if settings.cors_allow_credentials() {
            tracing::warn!("CORS_ALLOW_ORIGINS=* disables credentialed requests");
        }
        return Ok(base.allow_origin(AllowOrigin::any()).allow_headers(Any));
    }

    let list = origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(HeaderValue::from_str)
        .collect::<Result<Vec<_>, _>>()
        .context("CORS_ALLOW_ORIGINS contains an invalid origin")?;
    anyhow::ensure!(!list.is_empty(), "CORS_ALLOW_ORIGINS must name at least one origin");

    Ok(base
        .allow_origin(AllowOrigin::list(list))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(settings.cors_allow_credentials()))
}

async fn home() -> Json<Value> {
    Json(json!({ "message": format!("{ENGINE_NAME} is live") }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn rank(State(state): State<AppState>) -> Json<RankResponse> {
    let snapshot = state.cache.get().await;
    Json(RankResponse::from(snapshot.as_ref()))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
