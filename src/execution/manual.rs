use crate::models::{BrokerPosition, SymbolInfo};
use crate::risk::loss_per_lot;

/// What to do with a position opened outside the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualAction {
    Leave,
    /// Neither stop nor target, close it
    ForceClose,
    /// Target but no stop, protect it
    SetStop(f64),
}

/// Policy for manual positions
///
/// A position without stop and target is closed. One with only a target
/// gets a stop at the distance that loses `max_risk_usd` at its volume.
pub fn manual_action(position: &BrokerPosition, info: Option<&SymbolInfo>, max_risk_usd: f64) -> ManualAction {
    let has_stop = position.stop > 0.0;
    let has_target = position.target > 0.0;

    match (has_stop, has_target) {
        (false, false) => ManualAction::ForceClose,
        (false, true) => {
            let Some(stop) = info.and_then(|info| risk_stop(position, info, max_risk_usd)) else {
                tracing::warn!(
                    ticket = position.ticket,
                    "{}: cannot price a protective stop",
                    position.symbol
                );
                return ManualAction::Leave;
            };
            ManualAction::SetStop(stop)
        }
        _ => ManualAction::Leave,
    }
}

/// Stop price at which the position loses `max_risk_usd`
fn risk_stop(position: &BrokerPosition, info: &SymbolInfo, max_risk_usd: f64) -> Option<f64> {
    if max_risk_usd <= 0.0 || position.volume <= 0.0 {
        return None;
    }
    // money per unit of price for one lot
    let per_lot = loss_per_lot(info, 1.0)?;
    let distance = max_risk_usd / (per_lot * position.volume);
    Some(position.open_price - position.side.sign() * distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::Utc;

    fn info() -> SymbolInfo {
        SymbolInfo {
            symbol: "EURUSD".to_string(),
            point: 0.00001,
            tick_size: 0.00001,
            tick_value: 1.0,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            stops_level: 0,
        }
    }

    fn position(side: Side, stop: f64, target: f64) -> BrokerPosition {
        BrokerPosition {
            ticket: 42,
            symbol: "EURUSD".to_string(),
            side,
            volume: 0.1,
            open_price: 1.1000,
            stop,
            target,
            profit: 0.0,
            magic: 0,
            comment: String::new(),
            open_time: Utc::now(),
        }
    }

    #[test]
    fn test_naked_position_is_closed() {
        assert_eq!(manual_action(&position(Side::Buy, 0.0, 0.0), Some(&info()), 1.0), ManualAction::ForceClose);
    }

    #[test]
    fn test_target_only_gets_risk_stop() {
        // $1 at 0.1 lot = 10 points = 0.0001
        match manual_action(&position(Side::Buy, 0.0, 1.1050), Some(&info()), 1.0) {
            ManualAction::SetStop(stop) => assert!((stop - 1.0999).abs() < 1e-9),
            other => panic!("expected stop, got {:?}", other),
        }
        match manual_action(&position(Side::Sell, 0.0, 1.0950), Some(&info()), 1.0) {
            ManualAction::SetStop(stop) => assert!((stop - 1.1001).abs() < 1e-9),
            other => panic!("expected stop, got {:?}", other),
        }
    }

    #[test]
    fn test_protected_position_is_left_alone() {
        assert_eq!(manual_action(&position(Side::Buy, 1.0990, 0.0), Some(&info()), 1.0), ManualAction::Leave);
        assert_eq!(manual_action(&position(Side::Buy, 0.0, 1.1050), None, 1.0), ManualAction::Leave);
    }
}
