// Technical indicators module
// Pure functions over bar series: ATR, SuperTrend, RSI, candle patterns,
// support/resistance, triangle breakouts and close-over-close streaks.
// Insufficient history yields None, never an error.

pub mod atr;
pub mod patterns;
pub mod rsi;
pub mod streaks;
pub mod supertrend;
pub mod triangle;

pub use atr::{calculate_atr, calculate_atr_series, true_range_series};
pub use patterns::{
    detect_candle_pattern, has_candle_pattern, support_resistance, CandlePattern, PatternKind,
    SUPPORT_RESISTANCE_LOOKBACK,
};
pub use rsi::{calculate_rsi, calculate_rsi_series};
pub use streaks::{analyze_streak, MoveStats, StreakAnalysis};
pub use supertrend::{calculate_supertrend, trend_direction, SuperTrendFrame, Trend};
pub use triangle::{detect_triangle_breakout, TriangleParams};

use crate::models::Bar;

/// Close prices of `bars`, in order
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
