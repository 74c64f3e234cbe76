// Risk management module
pub mod circuit_breakers;
pub mod sizing;

pub use circuit_breakers::{CircuitBreakerTrip, CircuitBreakers, TradingState};
pub use sizing::{
    effective_risk_fraction, loss_per_lot, risk_usd, InstrumentClass, PositionSizer, SizedVolume,
    VolumeBounds,
};
