use crate::domain::price::{FeatureRow, PriceBar};

/// Derives rolling features for every bar that has a full trailing window.
///
/// Row `t` needs `close[t - window]` for momentum and `window` log returns
/// (`t - window + 1 ..= t`) for volatility, so the first `window` bars never produce
/// a row. Rows touching a non-finite price inside their window are dropped as well.
pub fn compute_features(bars: &[PriceBar], window: usize) -> Vec<FeatureRow> {
    if window < 2 || bars.len() <= window {
        return Vec::new();
    }

    let log_returns: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(t, bar)| {
            let prev = bars.get(t.checked_sub(1)?)?;
            finite((bar.close / prev.close).ln())
        })
        .collect();

    let mut out = Vec::with_capacity(bars.len() - window);
    for t in window..bars.len() {
        let bar = &bars[t];
        if !bar.has_finite_prices() {
            continue;
        }

        let Some(log_return) = log_returns[t] else {
            continue;
        };
        let Some(volatility) = sample_stddev(&log_returns[t + 1 - window..=t]) else {
            continue;
        };
        let Some(momentum) = finite(bar.close / bars[t - window].close - 1.0) else {
            continue;
        };

        out.push(FeatureRow {
            bar: bar.clone(),
            log_return,
            volatility,
            momentum,
        });
    }
    out
}

/// Most recent valid row, if any.
pub fn latest_features(bars: &[PriceBar], window: usize) -> Option<FeatureRow> {
    compute_features(bars, window).pop()
}

fn sample_stddev(values: &[Option<f64>]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let mut xs = Vec::with_capacity(values.len());
    for v in values {
        xs.push((*v)?);
    }

    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let ss = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    finite((ss / (n - 1.0)).sqrt())
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
