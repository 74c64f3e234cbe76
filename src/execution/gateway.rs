use thiserror::Error;

use crate::models::{
    AccountInfo, Bar, BrokerPosition, ClosedDeal, OrderRequest, OrderResult, SymbolInfo, Tick,
    Timeframe,
};

/// Fewer bars than this is treated as a data failure
pub const MIN_USABLE_BARS: usize = 50;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not connected to the broker")]
    NotConnected,

    #[error("symbol {0} is not available")]
    SymbolUnavailable(String),

    #[error("{symbol} {timeframe}: only {got} bars available (need {MIN_USABLE_BARS})")]
    InsufficientBars {
        symbol: String,
        timeframe: Timeframe,
        got: usize,
    },

    #[error("no price data for {0}")]
    NoTick(String),

    #[error("position {0} not found")]
    UnknownPosition(u64),

    #[error("broker error {code}: {message}")]
    Broker { code: u32, message: String },
}

/// Synchronous broker terminal interface
///
/// All calls happen on the engine loop, one at a time.
pub trait BrokerGateway: Send {
    fn connect(&mut self) -> Result<(), GatewayError>;

    /// Best effort, never fails
    fn disconnect(&mut self);

    fn account(&self) -> Result<AccountInfo, GatewayError>;

    fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, GatewayError>;

    /// Make the symbol tradable (e.g. add it to the market watch)
    fn ensure_symbol(&mut self, symbol: &str) -> Result<(), GatewayError>;

    /// Latest `count` bars, oldest first, the last one possibly still forming
    ///
    /// Fails with [`GatewayError::InsufficientBars`] below [`MIN_USABLE_BARS`].
    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize)
        -> Result<Vec<Bar>, GatewayError>;

    fn tick(&self, symbol: &str) -> Result<Tick, GatewayError>;

    /// Open positions, optionally for one symbol
    fn positions(&self, symbol: Option<&str>) -> Result<Vec<BrokerPosition>, GatewayError>;

    /// Most recent `limit` deals for `symbol`
    fn closed_deals(&self, symbol: &str, limit: usize) -> Result<Vec<ClosedDeal>, GatewayError>;

    fn submit_market_order(&mut self, request: &OrderRequest) -> Result<OrderResult, GatewayError>;

    /// Set stop and target on an open position, 0.0 clears a level
    fn modify_position(&mut self, ticket: u64, stop: f64, target: f64) -> Result<(), GatewayError>;

    fn close_position(&mut self, ticket: u64) -> Result<OrderResult, GatewayError>;
}

/// Reject a bar fetch that came back too short
pub fn require_usable_bars(
    symbol: &str,
    timeframe: Timeframe,
    bars: Vec<Bar>,
) -> Result<Vec<Bar>, GatewayError> {
    if bars.len() < MIN_USABLE_BARS {
        return Err(GatewayError::InsufficientBars {
            symbol: symbol.to_string(),
            timeframe,
            got: bars.len(),
        });
    }
    Ok(bars)
}
