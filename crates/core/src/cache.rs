use crate::domain::ranking::RankingSnapshot;
use crate::ranking::RankingEngine;
use crate::time::market::{Clock, MarketTime};
use chrono::NaiveDate;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CachedRanking {
    computed_date: NaiveDate,
    snapshot: Arc<RankingSnapshot>,
}

/// Memoizes one ranking per market date.
///
/// The lock is held across recomputation, so requests racing on a stale cache wait
/// for the single in-flight run and then read its result.
pub struct DailyCache {
    engine: RankingEngine,
    clock: Arc<dyn Clock>,
    market: MarketTime,
    state: tokio::sync::Mutex<Option<CachedRanking>>,
}

impl DailyCache {
    pub fn new(engine: RankingEngine, clock: Arc<dyn Clock>, market: MarketTime) -> Self {
        Self {
            engine,
            clock,
            market,
            state: tokio::sync::Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    /// Today's snapshot, recomputing first if the cache is stale.
    pub async fn get(&self) -> Arc<RankingSnapshot> {
        let mut guard = self.state.lock().await;

        let now = self.market.local(self.clock.now_utc());
        let today = now.date_naive();

        if let Some(cached) = guard.as_ref() {
            if cached.computed_date == today {
                return cached.snapshot.clone();
            }
            tracing::info!(
                cached_date = %cached.computed_date,
                %today,
                "market date rolled over; ranking cache is stale"
            );
        }

        let snapshot = Arc::new(self.engine.run(now).await);
        *guard = Some(CachedRanking {
            computed_date: today,
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    /// Cached snapshot if one exists for today, without triggering a run.
    pub async fn peek(&self) -> Option<Arc<RankingSnapshot>> {
        let today = self.market.market_date(self.clock.now_utc());
        let guard = self.state.lock().await;
        guard
            .as_ref()
            .filter(|c| c.computed_date == today)
            .map(|c| c.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ranking::{RankResponse, Ranking};
    use crate::ranking::engine::tests::{trending, FakeSource};
    use crate::ranking::EngineConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(t)))
        }

        fn advance(&self, d: Duration) {
            let mut t = self.0.lock().unwrap();
            *t += d;
        }
    }

    impl Clock for ManualClock {
        fn now_utc(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn cache_with(source: Arc<FakeSource>, clock: Arc<ManualClock>) -> DailyCache {
        let config = EngineConfig::default().with_universe(["A.NS", "B.NS", "C.NS"]);
        DailyCache::new(
            RankingEngine::new(source, config),
            clock,
            MarketTime::ist(),
        )
    }

    fn source() -> Arc<FakeSource> {
        Arc::new(
            FakeSource::default()
                .with("A.NS", &trending(60, 100.0, 0.5))
                .with("B.NS", &trending(60, 100.0, -0.5))
                .with("C.NS", &trending(60, 50.0, 1.0)),
        )
    }

    #[tokio::test]
    async fn same_day_requests_hit_the_cache() {
        let src = source();
        // 2026-03-02 04:00 UTC = 09:30 IST
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap());
        let cache = cache_with(src.clone(), clock.clone());

        assert!(cache.peek().await.is_none());

        let first = cache.get().await;
        clock.advance(Duration::hours(5));
        let second = cache.get().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            RankResponse::from(first.as_ref()),
            RankResponse::from(second.as_ref())
        );
        assert_eq!(first.last_updated(), "2026-03-02 09:30");
        assert!(cache.peek().await.is_some());
    }

    #[tokio::test]
    async fn new_market_date_triggers_recomputation() {
        let src = source();
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap());
        let cache = cache_with(src.clone(), clock.clone());

        let first = cache.get().await;
        // 18:45 UTC = 00:15 IST on 2026-03-03.
        clock.advance(Duration::minutes(14 * 60 + 45));
        assert!(cache.peek().await.is_none());
        let second = cache.get().await;

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(src.calls.load(Ordering::SeqCst), 6);
        assert_eq!(second.as_of_date, NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
        assert_eq!(second.last_updated(), "2026-03-03 00:15");
        assert_ne!(first.last_updated(), second.last_updated());
    }

    #[tokio::test]
    async fn concurrent_stale_requests_share_one_run() {
        let src = source();
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap());
        let cache = cache_with(src.clone(), clock);

        let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.get());

        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn empty_result_is_cached_for_the_day() {
        let src = Arc::new(FakeSource::default());
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap());
        let cache = cache_with(src.clone(), clock);

        let first = cache.get().await;
        let _ = cache.get().await;

        assert_eq!(first.ranking, Ranking::Empty);
        assert_eq!(src.calls.load(Ordering::SeqCst), 3);
    }
}
