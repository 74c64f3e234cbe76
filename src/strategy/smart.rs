use super::{
    signals::{meets_threshold, rsi_is_neutral, SignalConfig},
    MarketData, Strategy,
};
use crate::indicators::{
    calculate_rsi, calculate_supertrend, closes, detect_candle_pattern, support_resistance,
    trend_direction, SUPPORT_RESISTANCE_LOOKBACK,
};
use crate::models::{Side, StrategyTag, Timeframe, TradeSignal};

const BASE_CONFIDENCE: f64 = 0.5;
const HIGHER_TREND_BONUS: f64 = 0.2;
const LEVEL_BONUS: f64 = 0.15;
const RSI_BONUS: f64 = 0.15;
/// Price within this fraction of support/resistance counts as "at the level"
const LEVEL_PROXIMITY: f64 = 0.01;

/// Multi-factor scoring entry
///
/// A fast-timeframe candle pattern sets the side and the trend timeframe
/// must agree. Confidence starts at 0.5 and earns bonuses for higher
/// timeframe agreement, proximity to support/resistance and a neutral RSI.
#[derive(Debug, Clone)]
pub struct SmartStrategy {
    trigger_timeframe: Timeframe,
    trend_timeframe: Timeframe,
    /// Optional confirmation timeframe worth a bonus
    higher_timeframe: Option<Timeframe>,
    config: SignalConfig,
    min_confidence: f64,
}

impl SmartStrategy {
    pub fn new(trigger_timeframe: Timeframe, trend_timeframe: Timeframe, config: SignalConfig) -> Self {
        Self {
            trigger_timeframe,
            trend_timeframe,
            higher_timeframe: None,
            config,
            min_confidence: 0.65,
        }
    }

    pub fn with_higher_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.higher_timeframe = Some(timeframe);
        self
    }

    /// Confidence score for `side`, before the threshold is applied
    fn score(&self, market: &MarketData, side: Side, price: f64) -> f64 {
        let trend_bars = market.bars(self.trend_timeframe);
        let mut confidence = BASE_CONFIDENCE;

        if let Some(higher) = self.higher_timeframe {
            let agrees = trend_direction(market.bars(higher), self.config.atr_period, self.config.multiplier)
                .is_some_and(|t| t.agrees_with(side));
            if agrees {
                confidence += HIGHER_TREND_BONUS;
            }
        }

        if let Some((support, resistance)) = support_resistance(trend_bars, SUPPORT_RESISTANCE_LOOKBACK) {
            let at_level = match side {
                Side::Buy => price <= support * (1.0 + LEVEL_PROXIMITY),
                Side::Sell => price >= resistance * (1.0 - LEVEL_PROXIMITY),
            };
            if at_level {
                confidence += LEVEL_BONUS;
            }
        }

        if calculate_rsi(&closes(trend_bars), self.config.rsi_period).is_some_and(rsi_is_neutral) {
            confidence += RSI_BONUS;
        }

        confidence
    }
}

impl Default for SmartStrategy {
    fn default() -> Self {
        Self::new(Timeframe::M1, Timeframe::M15, SignalConfig::default())
    }
}

impl Strategy for SmartStrategy {
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal> {
        let trigger = market.bars(self.trigger_timeframe);
        let trend_bars = market.bars(self.trend_timeframe);
        let min = self.min_bars_required();
        if trigger.len() < min || trend_bars.len() < min {
            return None;
        }
        if let Some(higher) = self.higher_timeframe {
            if market.bars(higher).len() < min {
                return None;
            }
        }

        let side = detect_candle_pattern(trigger)?.side;
        let frame = calculate_supertrend(trend_bars, self.config.atr_period, self.config.multiplier);
        if !frame.last_trend()?.agrees_with(side) {
            return None;
        }

        let price = trigger.last()?.close;
        let confidence = self.score(market, side, price);
        if !meets_threshold(confidence, self.min_confidence) {
            return None;
        }

        TradeSignal::from_atr(
            side,
            price,
            frame.last_atr()?,
            self.config.stop_atr_mult,
            self.config.reward_risk,
            StrategyTag::Smart,
            confidence,
        )
    }

    fn name(&self) -> &str {
        "smart"
    }

    fn tag(&self) -> StrategyTag {
        StrategyTag::Smart
    }

    fn timeframe(&self) -> Timeframe {
        self.trigger_timeframe
    }

    fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut timeframes = vec![self.trigger_timeframe, self.trend_timeframe];
        timeframes.extend(self.higher_timeframe);
        timeframes
    }

    fn min_bars_required(&self) -> usize {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{TimeZone, Utc};

    fn bars(closes: &[f64], minutes: i64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + chrono::Duration::minutes(minutes * i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn oscillating(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 100.0 } else { 100.5 }).collect()
    }

    /// M1 series ending in a strong bullish candle closing at 101.5
    fn bullish_trigger() -> Vec<Bar> {
        let mut m1 = bars(&[101.0; 9], 1);
        let mut last = m1[8].clone();
        last.timestamp = last.timestamp + chrono::Duration::minutes(1);
        last.open = 101.0;
        last.high = 101.6;
        last.low = 100.9;
        last.close = 101.5;
        m1.push(last);
        m1
    }

    #[test]
    fn test_neutral_rsi_reaches_threshold() {
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&oscillating(30), 15));

        let signal = SmartStrategy::default().evaluate(&market).unwrap();
        assert_eq!(signal.side(), Side::Buy);
        assert_eq!(signal.tag(), StrategyTag::Smart);
        assert!((signal.confidence() - 0.65).abs() < 1e-9);
        assert_eq!(signal.entry(), 101.5);
    }

    #[test]
    fn test_higher_timeframe_bonus() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&oscillating(30), 15))
            .with_bars(Timeframe::H1, bars(&rising, 60));

        let strategy = SmartStrategy::default().with_higher_timeframe(Timeframe::H1);
        let signal = strategy.evaluate(&market).unwrap();
        assert!((signal.confidence() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_without_bonuses() {
        // strong rise: trend agrees but RSI is stretched and price is far from support
        let rising: Vec<f64> = (0..30).map(|i| 2.0 + 3.4 * i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&rising, 15));

        assert!(SmartStrategy::default().evaluate(&market).is_none());
    }

    #[test]
    fn test_trend_must_agree() {
        let falling: Vec<f64> = (0..30).map(|i| 140.0 - 1.5 * i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&falling, 15));

        assert!(SmartStrategy::default().evaluate(&market).is_none());
    }
}
