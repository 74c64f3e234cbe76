use super::{signals::{meets_threshold, SignalConfig}, MarketData, Strategy};
use crate::indicators::{
    analyze_streak, calculate_rsi, calculate_supertrend, closes, has_candle_pattern,
};
use crate::models::{Side, StrategyTag, Timeframe, TradeSignal};

/// Ride a consecutive-close streak that historically tends to continue
///
/// The streak is measured on the trend timeframe, the entry is triggered by a
/// candle pattern on the fast timeframe.
#[derive(Debug, Clone)]
pub struct StreakStrategy {
    trigger_timeframe: Timeframe,
    streak_timeframe: Timeframe,
    config: SignalConfig,
    min_length: usize,
    /// Minimum historical continuation rate, exclusive
    min_continuation: f64,
    min_confidence: f64,
}

impl StreakStrategy {
    pub fn new(trigger_timeframe: Timeframe, streak_timeframe: Timeframe, config: SignalConfig) -> Self {
        Self {
            trigger_timeframe,
            streak_timeframe,
            config,
            min_length: 3,
            min_continuation: 0.6,
            min_confidence: 0.65,
        }
    }
}

impl Default for StreakStrategy {
    fn default() -> Self {
        Self::new(Timeframe::M1, Timeframe::M15, SignalConfig::default())
    }
}

impl Strategy for StreakStrategy {
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal> {
        let trigger = market.bars(self.trigger_timeframe);
        let bars = market.bars(self.streak_timeframe);
        if trigger.len() < 3 {
            return None;
        }

        let streak = analyze_streak(bars)?;
        if streak.length < self.min_length || streak.continuation_prob <= self.min_continuation {
            return None;
        }

        let side = streak.side;
        let frame = calculate_supertrend(bars, self.config.atr_period, self.config.multiplier);
        if !frame.last_trend()?.agrees_with(side) {
            return None;
        }
        if !has_candle_pattern(trigger, side) {
            return None;
        }

        let rsi = calculate_rsi(&closes(bars), self.config.rsi_period)?;
        let stretched = match side {
            Side::Buy => rsi >= 75.0,
            Side::Sell => rsi <= 25.0,
        };
        if stretched {
            return None;
        }

        let mut confidence = 0.5 + streak.continuation_prob * 0.3;
        if streak.stage_moves.avg_pct > 0.0 {
            confidence += 0.1;
        }
        if !meets_threshold(confidence, self.min_confidence) {
            return None;
        }

        tracing::debug!(
            "{} streak {} x{} continuation {:.0}% ({} matches)",
            market.symbol,
            side,
            streak.length,
            streak.continuation_prob * 100.0,
            streak.matching_runs
        );

        TradeSignal::from_atr(
            side,
            trigger.last()?.close,
            frame.last_atr()?,
            self.config.stop_atr_mult,
            self.config.reward_risk,
            StrategyTag::Streak,
            confidence,
        )
    }

    fn name(&self) -> &str {
        "streak"
    }

    fn tag(&self) -> StrategyTag {
        StrategyTag::Streak
    }

    fn timeframe(&self) -> Timeframe {
        self.trigger_timeframe
    }

    fn required_timeframes(&self) -> Vec<Timeframe> {
        vec![self.trigger_timeframe, self.streak_timeframe]
    }

    fn min_bars_required(&self) -> usize {
        10
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

    /// Four cycles of five up closes and two down closes, then three up closes
    fn staircase(down_step: f64) -> Vec<f64> {
        let mut closes = vec![100.0];
        for _ in 0..4 {
            for _ in 0..5 {
                closes.push(closes[closes.len() - 1] + 1.0);
            }
            for _ in 0..2 {
                closes.push(closes[closes.len() - 1] - down_step);
            }
        }
        for _ in 0..3 {
            closes.push(closes[closes.len() - 1] + 1.0);
        }
        closes
    }

    fn bullish_trigger() -> Vec<Bar> {
        let mut m1 = bars(&[120.0; 5], 1);
        m1[4].open = 119.5;
        m1[4].high = 120.1;
        m1
    }

    #[test]
    fn test_streak_long() {
        let market = MarketData::new("XAUUSD", 0.01)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&staircase(1.0), 15));

        let signal = StreakStrategy::default().evaluate(&market).unwrap();
        assert_eq!(signal.side(), Side::Buy);
        assert_eq!(signal.tag(), StrategyTag::Streak);
        // every earlier 3+ up run went on to 5: 0.5 + 0.3 + 0.1
        assert!((signal.confidence() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_stretched_rsi_blocks_entry() {
        let market = MarketData::new("XAUUSD", 0.01)
            .with_bars(Timeframe::M1, bullish_trigger())
            .with_bars(Timeframe::M15, bars(&staircase(0.5), 15));

        assert!(StreakStrategy::default().evaluate(&market).is_none());
    }

    #[test]
    fn test_trigger_candle_must_agree() {
        let mut trigger = bullish_trigger();
        trigger[4].open = 120.5;
        trigger[4].high = 120.6;
        trigger[4].low = 119.9;
        let market = MarketData::new("XAUUSD", 0.01)
            .with_bars(Timeframe::M1, trigger)
            .with_bars(Timeframe::M15, bars(&staircase(1.0), 15));

        assert!(StreakStrategy::default().evaluate(&market).is_none());
    }
}
