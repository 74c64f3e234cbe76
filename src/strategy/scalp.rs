use super::{
    signals::{trend_entry, SignalConfig},
    MarketData, Strategy,
};
use crate::indicators::{calculate_atr, trend_direction, TriangleParams};
use crate::models::{StrategyTag, Timeframe, TradeSignal};

const SCALP_CONFIDENCE: f64 = 0.6;

/// Swing rules on a fast timeframe, following the trend of a slower one
#[derive(Debug, Clone)]
pub struct ScalpStrategy {
    timeframe: Timeframe,
    trend_timeframe: Timeframe,
    config: SignalConfig,
    triangle: Option<TriangleParams>,
    /// Skip quiet markets: minimum fast-timeframe ATR in points
    min_atr_points: f64,
}

impl ScalpStrategy {
    pub fn new(timeframe: Timeframe, trend_timeframe: Timeframe, config: SignalConfig) -> Self {
        Self {
            timeframe,
            trend_timeframe,
            config,
            triangle: None,
            min_atr_points: 3.0,
        }
    }

    pub fn with_triangle(mut self, params: TriangleParams) -> Self {
        self.triangle = Some(params);
        self
    }

    pub fn with_min_atr_points(mut self, points: f64) -> Self {
        self.min_atr_points = points;
        self
    }
}

impl Default for ScalpStrategy {
    fn default() -> Self {
        Self::new(
            Timeframe::M1,
            Timeframe::M15,
            SignalConfig::default().with_exits(1.2, 1.2),
        )
    }
}

impl Strategy for ScalpStrategy {
    fn evaluate(&self, market: &MarketData) -> Option<TradeSignal> {
        let fast = market.bars(self.timeframe);
        let slow = market.bars(self.trend_timeframe);
        if fast.len() < self.min_bars_required() || slow.len() < self.min_bars_required() {
            return None;
        }
        if market.point <= 0.0 {
            return None;
        }

        let atr = calculate_atr(fast, self.config.atr_period)?;
        if atr / market.point < self.min_atr_points {
            tracing::debug!(
                "{} scalp skipped: ATR {:.1} pts below {:.1}",
                market.symbol,
                atr / market.point,
                self.min_atr_points
            );
            return None;
        }

        let trend = trend_direction(slow, self.config.atr_period, self.config.multiplier)?;
        trend_entry(
            fast,
            trend,
            &self.config,
            self.triangle.as_ref(),
            StrategyTag::Scalp,
            SCALP_CONFIDENCE,
        )
    }

    fn name(&self) -> &str {
        "scalp"
    }

    fn tag(&self) -> StrategyTag {
        StrategyTag::Scalp
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn required_timeframes(&self) -> Vec<Timeframe> {
        vec![self.timeframe, self.trend_timeframe]
    }

    fn min_bars_required(&self) -> usize {
        10
    }
}
