/// Calculate Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions. Gains and losses are smoothed with
/// Wilder's exponential average (alpha = 1/period), seeded at the first
/// price with zero change.
///
/// A zero average loss is replaced by 1 before dividing, so a series with
/// no losses does not divide by zero.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() || period == 0 {
        return Vec::new();
    }

    let alpha = 1.0 / period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut series = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        let change = if i == 0 { 0.0 } else { prices[i] - prices[i - 1] };
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i == 0 {
            avg_gain = gain;
            avg_loss = loss;
        } else {
            avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        }

        let denominator = if avg_loss == 0.0 { 1.0 } else { avg_loss };
        let rs = avg_gain / denominator;
        series.push(100.0 - 100.0 / (1.0 + rs));
    }

    series
}

/// Latest RSI, or None with fewer than `period + 1` prices
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    calculate_rsi_series(prices, period).last().copied()
}
