use crate::models::{BrokerPosition, Side, SymbolInfo, Tick};

/// Profit-based trailing stop settings
#[derive(Debug, Clone, Copy)]
pub struct TrailingConfig {
    /// Profit that arms the trail
    pub activate_usd: f64,
    /// Profit given back from the current level
    pub distance_usd: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            activate_usd: 5.0,
            distance_usd: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailDecision {
    /// Profit below the activation level
    Inactive,
    /// Desired lock does not beat the one already held
    NoImprovement,
    /// New stop would sit inside the broker stops level
    TooCloseToPrice,
    /// New stop does not move forward by more than a point
    TooSmallStep,
    /// Tick size/value unusable
    NoPricing,
    Move { stop: f64, lock: f64 },
}

/// Price that realizes `lock` dollars of profit on the position
pub fn lock_price(position: &BrokerPosition, info: &SymbolInfo, lock: f64) -> Option<f64> {
    if info.tick_size <= 0.0 || info.tick_value <= 0.0 || position.volume <= 0.0 {
        return None;
    }
    let value_per_price = info.tick_value / info.tick_size * position.volume;
    Some(position.open_price + position.side.sign() * lock / value_per_price)
}

/// Decide whether to advance the stop of an engine position
///
/// Desired lock is `max(0, profit - distance)` once profit reaches the
/// activation level. The move is only proposed if it beats `previous_lock`,
/// clears the broker stops level from the current price and advances the
/// stop by more than one point.
pub fn evaluate_trailing(
    position: &BrokerPosition,
    info: &SymbolInfo,
    tick: &Tick,
    previous_lock: Option<f64>,
    config: &TrailingConfig,
) -> TrailDecision {
    if position.profit < config.activate_usd {
        return TrailDecision::Inactive;
    }

    let lock = (position.profit - config.distance_usd).max(0.0);
    if previous_lock.is_some_and(|held| lock <= held) {
        return TrailDecision::NoImprovement;
    }

    let Some(stop) = lock_price(position, info, lock) else {
        return TrailDecision::NoPricing;
    };

    let min_gap = f64::from(info.stops_level) * info.point;
    let clear_of_price = match position.side {
        Side::Buy => stop <= tick.bid - min_gap,
        Side::Sell => stop >= tick.ask + min_gap,
    };
    if !clear_of_price {
        return TrailDecision::TooCloseToPrice;
    }

    if position.stop > 0.0 {
        let advance = (stop - position.stop) * position.side.sign();
        if advance <= info.point {
            return TrailDecision::TooSmallStep;
        }
    }

    TrailDecision::Move { stop, lock }
}
