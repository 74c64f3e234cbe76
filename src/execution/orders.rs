use thiserror::Error;

use crate::execution::gateway::{BrokerGateway, GatewayError};
use crate::models::{OrderRequest, OrderResult, OrderStatus, Side};

/// Reward:risk used when the original stop distance is zero
pub const DEFAULT_REWARD_RISK: f64 = 1.5;
/// Margin over the broker minimum when widening stops
const BROKER_MIN_BUFFER: f64 = 1.15;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidOrder {
    #[error("non-finite price level")]
    NonFinite,

    #[error("stop/target on the wrong side of entry for {0}")]
    WrongSide(Side),

    #[error("stop distance {distance:.6} below minimum {min:.6}")]
    StopTooClose { distance: f64, min: f64 },

    #[error("volume must be positive")]
    ZeroVolume,
}

/// Smallest stop distance the engine will submit
///
/// `max(min_sl_points * point, broker_min_points * point * 1.15)`
pub fn min_stop_distance(min_sl_points: f64, broker_min_points: f64, point: f64) -> f64 {
    (min_sl_points * point).max(broker_min_points * point * BROKER_MIN_BUFFER)
}

fn reward_risk(entry: f64, stop: f64, target: f64) -> f64 {
    let distance = (entry - stop).abs();
    if distance > 0.0 {
        (target - entry).abs() / distance
    } else {
        DEFAULT_REWARD_RISK
    }
}

/// Levels `distance` away from `entry` on the stop side, target at `rr` times that
fn levels_at(side: Side, entry: f64, distance: f64, rr: f64) -> (f64, f64) {
    (
        entry - side.sign() * distance,
        entry + side.sign() * distance * rr,
    )
}

/// Widen the stop to at least `min_distance`, keeping the reward:risk ratio
///
/// Returns the (stop, target) pair unchanged when already wide enough.
pub fn adjust_stops(side: Side, entry: f64, stop: f64, target: f64, min_distance: f64) -> (f64, f64) {
    let distance = (entry - stop).abs();
    if distance >= min_distance {
        return (stop, target);
    }
    levels_at(side, entry, min_distance, reward_risk(entry, stop, target))
}

/// Final check before anything reaches the broker
pub fn validate_order(request: &OrderRequest, min_distance: f64) -> Result<(), InvalidOrder> {
    let OrderRequest {
        side,
        price,
        stop,
        target,
        volume,
        ..
    } = *request;

    if !(price.is_finite() && stop.is_finite() && target.is_finite()) {
        return Err(InvalidOrder::NonFinite);
    }
    if volume <= 0.0 {
        return Err(InvalidOrder::ZeroVolume);
    }

    let ordered = match side {
        Side::Buy => stop < price && price < target,
        Side::Sell => stop > price && price > target,
    };
    if !ordered {
        return Err(InvalidOrder::WrongSide(side));
    }

    let distance = (price - stop).abs();
    // relative slack for float noise from the adjustment arithmetic
    if distance < min_distance * (1.0 - 1e-9) {
        return Err(InvalidOrder::StopTooClose {
            distance,
            min: min_distance,
        });
    }
    Ok(())
}

/// Widening applied after an InvalidStops rejection
#[derive(Debug, Clone, Copy)]
pub struct StopRetryPolicy {
    pub max_attempts: u32,
    /// Multiple of the broker minimum distance
    pub broker_min_mult: f64,
    /// Multiple of the rejected distance
    pub distance_mult: f64,
}

impl Default for StopRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            broker_min_mult: 1.3,
            distance_mult: 1.2,
        }
    }
}

impl StopRetryPolicy {
    /// The request to resubmit after `rejected` came back InvalidStops
    ///
    /// Distance becomes `max(broker_min_distance * 1.3, 1.2 * rejected distance)`
    /// at the rejected request's reward:risk.
    pub fn widen(&self, rejected: &OrderRequest, broker_min_distance: f64) -> OrderRequest {
        let distance = (rejected.price - rejected.stop).abs();
        let rr = reward_risk(rejected.price, rejected.stop, rejected.target);
        let widened = (broker_min_distance * self.broker_min_mult).max(distance * self.distance_mult);
        let (stop, target) = levels_at(rejected.side, rejected.price, widened, rr);

        OrderRequest {
            stop,
            target,
            comment: format!("{} retry", rejected.comment),
            ..rejected.clone()
        }
    }
}

/// Result of a submission, with the request that produced it
#[derive(Debug, Clone)]
pub struct Submission {
    pub request: OrderRequest,
    pub result: OrderResult,
    pub retries: u32,
}

/// Submit a market order, retrying InvalidStops rejections per `policy`
///
/// Widened requests are validated again, an invalid one ends the retries
/// with the last broker result.
pub fn submit_with_retry<G: BrokerGateway + ?Sized>(
    gateway: &mut G,
    request: OrderRequest,
    policy: &StopRetryPolicy,
    broker_min_distance: f64,
    min_distance: f64,
) -> Result<Submission, GatewayError> {
    let mut request = request;
    let mut result = gateway.submit_market_order(&request)?;
    let mut retries = 0;

    while result.status == OrderStatus::InvalidStops && retries < policy.max_attempts {
        let widened = policy.widen(&request, broker_min_distance);
        if let Err(e) = validate_order(&widened, min_distance) {
            tracing::warn!("{}: widened order invalid ({}), giving up", request.symbol, e);
            break;
        }
        retries += 1;
        tracing::info!(
            "🔁 {}: invalid stops, retrying with SL {:.5} TP {:.5}",
            request.symbol,
            widened.stop,
            widened.target
        );
        request = widened;
        result = gateway.submit_market_order(&request)?;
    }

    Ok(Submission {
        request,
        result,
        retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(side: Side, price: f64, stop: f64, target: f64) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".to_string(),
            side,
            volume: 0.1,
            price,
            stop,
            target,
            magic: 777001,
            comment: "SWING".to_string(),
        }
    }

    #[test]
    fn test_min_stop_distance() {
        // 50 pts configured vs 60 * 1.15 = 69 pts broker
        let d = min_stop_distance(50.0, 60.0, 0.00001);
        assert!((d - 0.00069).abs() < 1e-12);

        let d = min_stop_distance(100.0, 60.0, 0.00001);
        assert!((d - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_adjust_stops_preserves_reward_risk() {
        let (stop, target) = adjust_stops(Side::Buy, 1.1000, 1.0998, 1.1004, 0.0010);

        assert!((stop - 1.0990).abs() < 1e-12);
        assert!((target - 1.1020).abs() < 1e-12);
    }

    #[test]
    fn test_adjust_stops_zero_distance_uses_default_rr() {
        let (stop, target) = adjust_stops(Side::Sell, 2000.0, 2000.0, 2000.0, 2.0);

        assert_eq!(stop, 2002.0);
        assert_eq!(target, 1997.0);
    }

    #[test]
    fn test_adjust_stops_leaves_wide_stops_alone() {
        assert_eq!(adjust_stops(Side::Buy, 100.0, 95.0, 110.0, 1.0), (95.0, 110.0));
    }

    #[test]
    fn test_validate_order() {
        assert!(validate_order(&request(Side::Buy, 1.1, 1.099, 1.102), 0.0005).is_ok());
        assert_eq!(
            validate_order(&request(Side::Buy, 1.1, 1.101, 1.102), 0.0005),
            Err(InvalidOrder::WrongSide(Side::Buy))
        );
        assert!(matches!(
            validate_order(&request(Side::Sell, 1.1, 1.1002, 1.0990), 0.0005),
            Err(InvalidOrder::StopTooClose { .. })
        ));
    }

    #[test]
    fn test_retry_widening() {
        let policy = StopRetryPolicy::default();
        let rejected = request(Side::Buy, 1.1000, 1.0990, 1.1015);

        // max(0.0006 * 1.3, 0.0010 * 1.2) = 0.0012
        let widened = policy.widen(&rejected, 0.0006);
        assert!((widened.stop - 1.0988).abs() < 1e-12);
        assert!((widened.target - 1.1018).abs() < 1e-12);
        assert_eq!(widened.comment, "SWING retry");

        // broker minimum dominates
        let widened = policy.widen(&rejected, 0.0020);
        assert!((widened.price - widened.stop - 0.0026).abs() < 1e-12);
    }
}
