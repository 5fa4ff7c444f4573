use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

// NSE trades on IST (UTC+05:30). The daily cache rolls over at IST midnight rather
// than at the host's local midnight.
const IST_OFFSET_MINUTES: i32 = 5 * 60 + 30;

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed exchange offset used for "today" and for display timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketTime {
    offset: FixedOffset,
}

impl MarketTime {
    pub fn ist() -> Self {
        let offset = FixedOffset::east_opt(IST_OFFSET_MINUTES * 60).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    pub fn from_offset_minutes(minutes: i32) -> anyhow::Result<Self> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("invalid market UTC offset: {minutes} minutes"))?;
        Ok(Self { offset })
    }

    /// Reads `MARKET_UTC_OFFSET_MINUTES`, defaulting to IST.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("MARKET_UTC_OFFSET_MINUTES") {
            Ok(s) => {
                let minutes = s
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("MARKET_UTC_OFFSET_MINUTES is not an integer: {s}"))?;
                Self::from_offset_minutes(minutes)
            }
            Err(_) => Ok(Self::ist()),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local(&self, now_utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        now_utc.with_timezone(&self.offset)
    }

    pub fn market_date(&self, now_utc: DateTime<Utc>) -> NaiveDate {
        self.local(now_utc).date_naive()
    }
}

impl Default for MarketTime {
    fn default() -> Self {
        Self::ist()
    }
}
