use super::{
    signals::{trend_entry, SignalConfig},
    MarketData, Strategy,
};
use crate::indicators::{trend_direction, TriangleParams};
use crate::models::{StrategyTag, Timeframe, TradeSignal};

const SWING_CONFIDENCE: f64 = 0.7;

/// SuperTrend swing entries on a single timeframe
///
/// Fires on a fresh SuperTrend flip (or, when triangle confirmation is on, a
/// triangle breakout in the trend direction), confirmed by a candle pattern
/// and RSI away from the extremes.
#[derive(Debug, Clone)]
pub struct SwingStrategy {
    timeframe: Timeframe,
    config: SignalConfig,
    triangle: Option<TriangleParams>,
}

impl SwingStrategy {
    pub fn new(timeframe: Timeframe, config: SignalConfig) -> Self {
        Self {
            timeframe,
            config,
            triangle: None,
        }
    }

    /// Require a triangle breakout instead of a fresh flip
    pub fn with_triangle(mut self, params: TriangleParams) -> Self {
        self.triangle = Some(params);
        self
    }
}

impl Default for SwingStrategy {
    fn default() -> Self {
        Self::new(Timeframe::M15, SignalConfig::default())
    }
}

impl Strategy for SwingStrategy {
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal> {
        let bars = market.bars(self.timeframe);
        if bars.len() < self.min_bars_required() {
            return None;
        }

        let trend = trend_direction(bars, self.config.atr_period, self.config.multiplier)?;
        trend_entry(
            bars,
            trend,
            &self.config,
            self.triangle.as_ref(),
            StrategyTag::Swing,
            SWING_CONFIDENCE,
        )
    }

    fn name(&self) -> &str {
        "swing"
    }

    fn tag(&self) -> StrategyTag {
        StrategyTag::Swing
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn min_bars_required(&self) -> usize {
        10
    }
}
