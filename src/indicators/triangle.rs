use crate::indicators::atr::calculate_atr;
use crate::models::{Bar, Side};

/// Triangle breakout parameters
#[derive(Debug, Clone, Copy)]
pub struct TriangleParams {
    pub lookback: usize,
    pub atr_period: usize,
    /// Breakout buffer beyond the projected line, in ATRs
    pub breakout_atr_mult: f64,
    /// End gap must be at most this fraction of the start gap
    pub max_gap_ratio: f64,
}

impl Default for TriangleParams {
    fn default() -> Self {
        Self {
            lookback: 40,
            atr_period: 14,
            breakout_atr_mult: 0.2,
            max_gap_ratio: 0.7,
        }
    }
}

/// Least-squares line through `values` at x = 0..n, returned as (slope, intercept)
fn fit_line(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Detect a breakout from a converging triangle over the last `lookback` bars
///
/// The highs must trend down and the lows up, with both gaps positive and
/// the end gap no wider than `max_gap_ratio` of the start gap. A close beyond
/// the projected line plus the ATR buffer is a breakout on that side.
pub fn detect_triangle_breakout(bars: &[Bar], params: &TriangleParams) -> Option<Side> {
    if params.lookback < 2 || bars.len() < params.lookback {
        return None;
    }

    let window = &bars[bars.len() - params.lookback..];
    let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = window.iter().map(|b| b.low).collect();

    let (high_slope, high_intercept) = fit_line(&highs)?;
    let (low_slope, low_intercept) = fit_line(&lows)?;

    if high_slope >= 0.0 || low_slope <= 0.0 {
        return None;
    }

    let end_x = (params.lookback - 1) as f64;
    let upper = high_slope * end_x + high_intercept;
    let lower = low_slope * end_x + low_intercept;
    let start_gap = high_intercept - low_intercept;
    let end_gap = upper - lower;

    if start_gap <= 0.0 || end_gap <= 0.0 || end_gap > params.max_gap_ratio * start_gap {
        return None;
    }

    let atr = calculate_atr(window, params.atr_period)?;
    let buffer = params.breakout_atr_mult * atr;
    let close = window[window.len() - 1].close;

    if close > upper + buffer {
        Some(Side::Buy)
    } else if close < lower - buffer {
        Some(Side::Sell)
    } else {
        None
    }
}
