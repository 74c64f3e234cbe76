use crate::indicators::atr::calculate_atr_series;
use crate::models::{Bar, Side};
use serde::Serialize;

/// SuperTrend direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Up,
    Down,
}

impl Trend {
    /// +1 for Up, -1 for Down
    pub fn as_i8(self) -> i8 {
        match self {
            Trend::Up => 1,
            Trend::Down => -1,
        }
    }

    /// Trade side that goes with this trend
    pub fn side(self) -> Side {
        match self {
            Trend::Up => Side::Buy,
            Trend::Down => Side::Sell,
        }
    }

    pub fn agrees_with(self, side: Side) -> bool {
        self.side() == side
    }
}

/// Per-bar SuperTrend output, every vector aligned with the input bars
#[derive(Debug, Clone, Default)]
pub struct SuperTrendFrame {
    pub atr: Vec<f64>,
    /// Trailing upper band (resistance while in a downtrend)
    pub upper: Vec<f64>,
    /// Trailing lower band (support while in an uptrend)
    pub lower: Vec<f64>,
    pub direction: Vec<Trend>,
    /// Down -> Up flip on this bar
    pub buy: Vec<bool>,
    /// Up -> Down flip on this bar
    pub sell: Vec<bool>,
}

impl SuperTrendFrame {
    pub fn len(&self) -> usize {
        self.direction.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direction.is_empty()
    }

    pub fn last_trend(&self) -> Option<Trend> {
        self.direction.last().copied()
    }

    pub fn last_atr(&self) -> Option<f64> {
        self.atr.last().copied()
    }

    /// Side of a flip on the most recent bar, if any
    pub fn fresh_flip(&self) -> Option<Side> {
        match (self.buy.last(), self.sell.last()) {
            (Some(true), _) => Some(Side::Buy),
            (_, Some(true)) => Some(Side::Sell),
            _ => None,
        }
    }

    /// Active band value (lower in an uptrend, upper in a downtrend)
    pub fn line(&self, index: usize) -> Option<f64> {
        match self.direction.get(index)? {
            Trend::Up => self.lower.get(index).copied(),
            Trend::Down => self.upper.get(index).copied(),
        }
    }
}

/// Compute SuperTrend over `bars`
///
/// Raw bands sit `multiplier * ATR` below and above the bar midpoint. The lower
/// band only ratchets up while the previous close stays above it, and the upper
/// band only ratchets down while the previous close stays below it. Direction
/// starts Up and flips when the close crosses the previous bar's opposite band.
///
/// # Arguments
/// * `bars` - Bar series in time order
/// * `atr_period` - ATR length (10 in the engine)
/// * `multiplier` - Band offset in ATRs (2.0 in the engine)
pub fn calculate_supertrend(bars: &[Bar], atr_period: usize, multiplier: f64) -> SuperTrendFrame {
    let n = bars.len();
    if n == 0 || atr_period == 0 {
        return SuperTrendFrame::default();
    }

    let atr = calculate_atr_series(bars, atr_period);
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);
    let mut direction = Vec::with_capacity(n);
    let mut buy = Vec::with_capacity(n);
    let mut sell = Vec::with_capacity(n);

    for i in 0..n {
        let mid = (bars[i].high + bars[i].low) / 2.0;
        let raw_upper = mid + multiplier * atr[i];
        let raw_lower = mid - multiplier * atr[i];

        if i == 0 {
            upper.push(raw_upper);
            lower.push(raw_lower);
            direction.push(Trend::Up);
            buy.push(false);
            sell.push(false);
            continue;
        }

        let prev_close = bars[i - 1].close;
        let prev_upper = upper[i - 1];
        let prev_lower = lower[i - 1];

        lower.push(if prev_close > prev_lower {
            raw_lower.max(prev_lower)
        } else {
            raw_lower
        });
        upper.push(if prev_close < prev_upper {
            raw_upper.min(prev_upper)
        } else {
            raw_upper
        });

        let close = bars[i].close;
        let prev_trend = direction[i - 1];
        let trend = match prev_trend {
            Trend::Down if close > prev_upper => Trend::Up,
            Trend::Up if close < prev_lower => Trend::Down,
            other => other,
        };

        direction.push(trend);
        buy.push(trend == Trend::Up && prev_trend == Trend::Down);
        sell.push(trend == Trend::Down && prev_trend == Trend::Up);
    }

    SuperTrendFrame {
        atr,
        upper,
        lower,
        direction,
        buy,
        sell,
    }
}

/// Current SuperTrend direction, or None for an empty series
pub fn trend_direction(bars: &[Bar], atr_period: usize, multiplier: f64) -> Option<Trend> {
    calculate_supertrend(bars, atr_period, multiplier).last_trend()
}
