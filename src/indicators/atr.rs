/// Average True Range (ATR) indicator
///
/// Measures market volatility by smoothing the true range of each bar.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// The first bar has no previous close, so its true range is High - Low.
/// Smoothing is Wilder's: an exponential average with alpha = 1/period,
/// seeded with the first true range.

use crate::models::Bar;

/// True range of every bar, aligned with `bars`
pub fn true_range_series(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            if i == 0 {
                return range;
            }
            let prev_close = bars[i - 1].close;
            range
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Wilder-smoothed ATR for every bar, aligned with `bars`
///
/// Returns an empty vector when `bars` is empty or `period` is 0.
pub fn calculate_atr_series(bars: &[Bar], period: usize) -> Vec<f64> {
    if bars.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = 1.0 / period as f64;
    let mut series = Vec::with_capacity(bars.len());
    let mut atr = 0.0;
    for (i, tr) in true_range_series(bars).into_iter().enumerate() {
        atr = if i == 0 { tr } else { alpha * tr + (1.0 - alpha) * atr };
        series.push(atr);
    }
    series
}

/// Latest ATR value, or None if fewer than `period` bars are available
pub fn calculate_atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    calculate_atr_series(bars, period).last().copied()
}
