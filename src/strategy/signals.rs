use crate::indicators::{
    calculate_rsi, calculate_supertrend, closes, detect_triangle_breakout, has_candle_pattern,
    TriangleParams, Trend,
};
use crate::models::{Bar, StrategyTag, TradeSignal};

/// Tolerance when comparing accumulated confidence against a threshold
const CONFIDENCE_EPSILON: f64 = 1e-9;

/// Indicator and exit parameters shared by the strategies
#[derive(Debug, Clone, Copy)]
pub struct SignalConfig {
    pub atr_period: usize,
    pub multiplier: f64,
    pub rsi_period: usize,
    /// Stop distance in ATRs
    pub stop_atr_mult: f64,
    /// Target distance as a multiple of the stop distance
    pub reward_risk: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            atr_period: 10,
            multiplier: 2.0,
            rsi_period: 14,
            stop_atr_mult: 2.0,
            reward_risk: 1.5,
        }
    }
}

impl SignalConfig {
    pub fn with_exits(mut self, stop_atr_mult: f64, reward_risk: f64) -> Self {
        self.stop_atr_mult = stop_atr_mult;
        self.reward_risk = reward_risk;
        self
    }
}

/// Validate that bars are in strictly increasing time order
///
/// # Returns
/// * `Ok(())` if every timestamp is after the previous one
/// * `Err` naming the first offending pair otherwise
pub fn validate_bar_sequence(bars: &[Bar]) -> anyhow::Result<()> {
    for window in bars.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            anyhow::bail!(
                "Bars are not strictly increasing: {} followed by {}",
                window[0].timestamp.format("%Y-%m-%d %H:%M"),
                window[1].timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

pub(crate) fn meets_threshold(confidence: f64, threshold: f64) -> bool {
    confidence + CONFIDENCE_EPSILON >= threshold
}

/// RSI strictly inside the (30, 70) band
pub(crate) fn rsi_is_neutral(rsi: f64) -> bool {
    rsi > 30.0 && rsi < 70.0
}

/// Trend-following entry on `bars` in the direction of `trend`
///
/// Trigger is a fresh SuperTrend flip into `trend` on the last bar, or a
/// triangle breakout agreeing with `trend` when `triangle` is set. The last
/// candle must also point in the trend direction with RSI inside (30, 70).
pub(crate) fn trend_entry(
    bars: &[Bar],
    trend: Trend,
    config: &SignalConfig,
    triangle: Option<&TriangleParams>,
    tag: StrategyTag,
    confidence: f64,
) -> Option<TradeSignal> {
    let frame = calculate_supertrend(bars, config.atr_period, config.multiplier);
    let side = trend.side();

    let triggered = match triangle {
        Some(params) => detect_triangle_breakout(bars, params) == Some(side),
        None => frame.fresh_flip() == Some(side),
    };
    if !triggered {
        return None;
    }

    if !has_candle_pattern(bars, side) {
        return None;
    }

    let rsi = calculate_rsi(&closes(bars), config.rsi_period)?;
    if !rsi_is_neutral(rsi) {
        return None;
    }

    let entry = bars.last()?.close;
    TradeSignal::from_atr(
        side,
        entry,
        frame.last_atr()?,
        config.stop_atr_mult,
        config.reward_risk,
        tag,
        confidence,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_bar(minute: i64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(minute),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume: 1.0,
        }
    }

    #[test]
    fn test_increasing_bars_pass() {
        let bars: Vec<Bar> = (0..10).map(|i| create_test_bar(i * 15)).collect();
        assert!(validate_bar_sequence(&bars).is_ok());
    }

    #[test]
    fn test_gaps_are_allowed() {
        let bars = vec![create_test_bar(0), create_test_bar(15), create_test_bar(600)];
        assert!(validate_bar_sequence(&bars).is_ok());
    }

    #[test]
    fn test_backwards_timestamps_fail() {
        let bars = vec![create_test_bar(15), create_test_bar(0)];
        assert!(validate_bar_sequence(&bars).is_err());
    }

    #[test]
    fn test_duplicate_timestamps_fail() {
        let bars = vec![create_test_bar(15), create_test_bar(15)];
        assert!(validate_bar_sequence(&bars).is_err());
    }

    #[test]
    fn test_threshold_tolerates_float_sums() {
        assert!(meets_threshold(0.5 + 0.15, 0.65));
        assert!(!meets_threshold(0.64, 0.65));
    }

    #[test]
    fn test_rsi_band_is_exclusive() {
        assert!(!rsi_is_neutral(30.0));
        assert!(rsi_is_neutral(30.1));
        assert!(!rsi_is_neutral(70.0));
    }
}
