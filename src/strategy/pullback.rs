use super::{signals::SignalConfig, MarketData, Strategy};
use crate::indicators::{calculate_rsi, calculate_supertrend, closes, trend_direction, Trend};
use crate::models::{StrategyTag, Timeframe, TradeSignal};

const PULLBACK_CONFIDENCE: f64 = 0.6;

/// Buy dips (sell rallies) while two timeframes agree on the trend
#[derive(Debug, Clone)]
pub struct PullbackStrategy {
    timeframe: Timeframe,
    higher_timeframe: Timeframe,
    config: SignalConfig,
    /// Long entries need RSI below this
    oversold: f64,
    /// Short entries need RSI above this
    overbought: f64,
}

impl PullbackStrategy {
    pub fn new(timeframe: Timeframe, higher_timeframe: Timeframe, config: SignalConfig) -> Self {
        Self {
            timeframe,
            higher_timeframe,
            config,
            oversold: 40.0,
            overbought: 60.0,
        }
    }
}

impl Default for PullbackStrategy {
    fn default() -> Self {
        Self::new(Timeframe::M15, Timeframe::H1, SignalConfig::default())
    }
}

impl Strategy for PullbackStrategy {
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal> {
        let fast = market.bars(self.timeframe);
        let slow = market.bars(self.higher_timeframe);
        if fast.len() < self.min_bars_required() || slow.len() < self.min_bars_required() {
            return None;
        }

        let frame = calculate_supertrend(fast, self.config.atr_period, self.config.multiplier);
        let trend = frame.last_trend()?;
        if trend_direction(slow, self.config.atr_period, self.config.multiplier)? != trend {
            return None;
        }

        let rsi = calculate_rsi(&closes(fast), self.config.rsi_period)?;
        let pulled_back = match trend {
            Trend::Up => rsi < self.oversold,
            Trend::Down => rsi > self.overbought,
        };
        if !pulled_back {
            return None;
        }

        TradeSignal::from_atr(
            trend.side(),
            fast.last()?.close,
            frame.last_atr()?,
            self.config.stop_atr_mult,
            self.config.reward_risk,
            StrategyTag::Pullback,
            PULLBACK_CONFIDENCE,
        )
    }

    fn name(&self) -> &str {
        "pullback"
    }

    fn tag(&self) -> StrategyTag {
        StrategyTag::Pullback
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn required_timeframes(&self) -> Vec<Timeframe> {
        vec![self.timeframe, self.higher_timeframe]
    }

    fn min_bars_required(&self) -> usize {
        self.config.rsi_period + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, Side};
    use chrono::{TimeZone, Utc};

    fn bars(closes: &[f64], minutes: i64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + chrono::Duration::minutes(minutes * i as i64),
                open: close,
                high: close + 5.0,
                low: close - 5.0,
                close,
                volume: 1.0,
            })
            .collect()
    }

    /// Slow wide-range rise, then a dip that stays inside the SuperTrend band
    fn rise_then_dip() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 100.0 + 0.5 * i as f64).collect();
        let top = closes[39];
        closes.extend((1..=6).map(|k| top - 2.0 * k as f64));
        closes
    }

    #[test]
    fn test_long_pullback_in_uptrend() {
        let rising: Vec<f64> = (0..40).map(|i| 100.0 + 5.0 * i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M15, bars(&rise_then_dip(), 15))
            .with_bars(Timeframe::H1, bars(&rising, 60));

        let signal = PullbackStrategy::default().evaluate(&market).unwrap();
        assert_eq!(signal.side(), Side::Buy);
        assert_eq!(signal.tag(), StrategyTag::Pullback);
    }

    #[test]
    fn test_no_pullback_without_dip() {
        let rising: Vec<f64> = (0..40).map(|i| 100.0 + 5.0 * i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M15, bars(&rising, 15))
            .with_bars(Timeframe::H1, bars(&rising, 60));

        assert!(PullbackStrategy::default().evaluate(&market).is_none());
    }

    #[test]
    fn test_timeframes_must_agree() {
        let falling: Vec<f64> = (0..40).map(|i| 400.0 - 5.0 * i as f64).collect();
        let market = MarketData::new("EURUSD", 0.00001)
            .with_bars(Timeframe::M15, bars(&rise_then_dip(), 15))
            .with_bars(Timeframe::H1, bars(&falling, 60));

        assert!(PullbackStrategy::default().evaluate(&market).is_none());
    }
}
