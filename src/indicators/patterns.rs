use crate::models::{Bar, Side};

/// Minimum bars before any candle pattern is reported
const MIN_PATTERN_BARS: usize = 3;

/// Default support/resistance lookback
pub const SUPPORT_RESISTANCE_LOOKBACK: usize = 20;

/// What made the last candle directional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Body covers at least half the range
    StrongBody,
    /// Rejection wick at least twice the body (hammer / shooting star)
    Rejection,
    /// Body engulfs the opposite-colored previous candle
    Engulfing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandlePattern {
    pub side: Side,
    pub kind: PatternKind,
}

/// Classify the most recent candle
///
/// Returns None with fewer than three bars, a zero-range candle, or a candle
/// that qualifies for neither side.
pub fn detect_candle_pattern(bars: &[Bar]) -> Option<CandlePattern> {
    if bars.len() < MIN_PATTERN_BARS {
        return None;
    }

    let last = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];
    let range = last.high - last.low;
    if range <= 0.0 {
        return None;
    }
    let body = (last.close - last.open).abs();

    if last.close > last.open {
        let lower_wick = last.open - last.low;
        let kind = if body / range >= 0.5 {
            Some(PatternKind::StrongBody)
        } else if lower_wick >= 2.0 * body {
            Some(PatternKind::Rejection)
        } else if prev.close < prev.open && last.close > prev.open && last.open < prev.close {
            Some(PatternKind::Engulfing)
        } else {
            None
        };
        return kind.map(|kind| CandlePattern { side: Side::Buy, kind });
    }

    if last.close < last.open {
        let upper_wick = last.high - last.open;
        let kind = if body / range >= 0.5 {
            Some(PatternKind::StrongBody)
        } else if upper_wick >= 2.0 * body {
            Some(PatternKind::Rejection)
        } else if prev.close > prev.open && last.close < prev.open && last.open > prev.close {
            Some(PatternKind::Engulfing)
        } else {
            None
        };
        return kind.map(|kind| CandlePattern { side: Side::Sell, kind });
    }

    None
}

/// True when the last candle is a pattern in the direction of `side`
pub fn has_candle_pattern(bars: &[Bar], side: Side) -> bool {
    detect_candle_pattern(bars).is_some_and(|p| p.side == side)
}

/// Lowest low and highest high over the last `lookback` bars
///
/// Returns (support, resistance), or None if there are fewer bars than `lookback`.
pub fn support_resistance(bars: &[Bar], lookback: usize) -> Option<(f64, f64)> {
    if lookback == 0 || bars.len() < lookback {
        return None;
    }

    let window = &bars[bars.len() - lookback..];
    let support = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let resistance = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    Some((support, resistance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                timestamp: start + chrono::Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: 1.0,
            })
            .collect()
    }

    const FILLER: (f64, f64, f64, f64) = (100.0, 101.0, 99.0, 100.0);

    #[test]
    fn test_strong_bullish_body() {
        let bars = create_test_bars(&[FILLER, FILLER, (100.0, 101.2, 99.8, 101.0)]);
        let pattern = detect_candle_pattern(&bars).unwrap();

        assert_eq!(pattern.side, Side::Buy);
        assert_eq!(pattern.kind, PatternKind::StrongBody);
    }

    #[test]
    fn test_hammer() {
        // body 0.2, lower wick 1.0, range 1.5
        let bars = create_test_bars(&[FILLER, FILLER, (100.0, 100.5, 99.0, 100.2)]);
        let pattern = detect_candle_pattern(&bars).unwrap();

        assert_eq!(pattern, CandlePattern { side: Side::Buy, kind: PatternKind::Rejection });
    }

    #[test]
    fn test_bearish_engulfing() {
        // prev bullish 100 -> 100.3, last bearish opens above and closes below
        let bars = create_test_bars(&[
            FILLER,
            (100.0, 100.9, 99.9, 100.3),
            (100.4, 100.8, 99.5, 99.9),
        ]);
        let pattern = detect_candle_pattern(&bars).unwrap();

        assert_eq!(pattern.side, Side::Sell);
        assert_eq!(pattern.kind, PatternKind::Engulfing);
        assert!(has_candle_pattern(&bars, Side::Sell));
        assert!(!has_candle_pattern(&bars, Side::Buy));
    }

    #[test]
    fn test_zero_range_and_short_history() {
        let flat = create_test_bars(&[FILLER, FILLER, (100.0, 100.0, 100.0, 100.0)]);
        assert!(detect_candle_pattern(&flat).is_none());

        let short = create_test_bars(&[FILLER, (100.0, 101.2, 99.8, 101.0)]);
        assert!(detect_candle_pattern(&short).is_none());
    }

    #[test]
    fn test_doji_has_no_pattern() {
        let bars = create_test_bars(&[FILLER, FILLER, (100.0, 101.0, 99.0, 100.0)]);
        assert!(detect_candle_pattern(&bars).is_none());
    }

    #[test]
    fn test_support_resistance_window() {
        let mut prices = vec![(100.0, 150.0, 50.0, 100.0)];
        prices.extend(std::iter::repeat(FILLER).take(20));
        let bars = create_test_bars(&prices);

        // the wide first bar is outside the 20-bar window
        assert_eq!(support_resistance(&bars, 20), Some((99.0, 101.0)));
        assert_eq!(support_resistance(&bars, 21), Some((50.0, 150.0)));
        assert!(support_resistance(&bars, 22).is_none());
    }
}
